//! Sorted catalogue of available and visible manifests

use std::cmp::Ordering;

use super::{BackendType, ManifestPtr};

/// Compare display names the way a user expects them sorted
///
/// Case-insensitive first, exact comparison as tiebreak so the order is total.
pub fn locale_aware_cmp(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| a.cmp(b))
}

/// Catalogue order: builtin backends first, then display name
pub fn alphabetize_manifests(a: &ManifestPtr, b: &ManifestPtr) -> Ordering {
    a.backend_type
        .cmp(&b.backend_type)
        .then_with(|| locale_aware_cmp(&a.name, &b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// The manifest catalogue
///
/// `available` holds every manifest contributed by a backend, `visible` the
/// subset offered when the user steps through effects. Both are kept in
/// [`alphabetize_manifests`] order at all times.
#[derive(Debug, Default)]
pub struct ManifestRegistry {
    available: Vec<ManifestPtr>,
    visible: Vec<ManifestPtr>,
}

impl ManifestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add manifests from a backend, skipping identities already present
    ///
    /// New manifests start visible. Returns how many were added.
    pub fn extend(&mut self, manifests: impl IntoIterator<Item = ManifestPtr>) -> usize {
        let mut added = 0;
        for manifest in manifests {
            if self.find(&manifest.id, manifest.backend_type).is_some() {
                log::warn!(
                    "Skipping duplicate effect manifest {}",
                    manifest.unique_id()
                );
                continue;
            }
            self.visible.push(manifest.clone());
            self.available.push(manifest);
            added += 1;
        }
        self.available.sort_by(alphabetize_manifests);
        self.visible.sort_by(alphabetize_manifests);
        added
    }

    /// Every known manifest in catalogue order
    pub fn available(&self) -> &[ManifestPtr] {
        &self.available
    }

    /// Visible manifests in catalogue order
    pub fn visible(&self) -> &[ManifestPtr] {
        &self.visible
    }

    /// Number of known manifests
    pub fn len(&self) -> usize {
        self.available.len()
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }

    /// Manifests matching a predicate, in catalogue order
    pub fn filtered<F>(&self, mut predicate: F) -> Vec<ManifestPtr>
    where
        F: FnMut(&ManifestPtr) -> bool,
    {
        self.available
            .iter()
            .filter(|m| predicate(m))
            .cloned()
            .collect()
    }

    /// Look up a manifest by identity
    pub fn find(&self, id: &str, backend_type: BackendType) -> Option<ManifestPtr> {
        self.available
            .iter()
            .find(|m| m.matches(id, backend_type))
            .cloned()
    }

    /// Look up a manifest by unique id (`"<id> <backend tag>"`)
    pub fn find_unique(&self, unique_id: &str) -> Option<ManifestPtr> {
        self.available
            .iter()
            .find(|m| m.unique_id() == unique_id)
            .cloned()
    }

    pub fn is_visible(&self, manifest: &ManifestPtr) -> bool {
        self.visible_position(manifest).is_ok()
    }

    /// Add or remove a manifest from the visible list
    ///
    /// Returns `true` when membership changed.
    pub fn set_visibility(&mut self, manifest: &ManifestPtr, visible: bool) -> bool {
        match (self.visible_position(manifest), visible) {
            (Err(insert_at), true) => {
                self.visible.insert(insert_at, manifest.clone());
                true
            }
            (Ok(index), false) => {
                self.visible.remove(index);
                true
            }
            _ => false,
        }
    }

    fn visible_position(&self, manifest: &ManifestPtr) -> Result<usize, usize> {
        self.visible
            .binary_search_by(|other| alphabetize_manifests(other, manifest))
    }

    /// Id of the visible effect after `id`, wrapping at the end
    ///
    /// An empty or unknown id selects the first visible effect. Returns an
    /// empty string when nothing is visible.
    pub fn next_effect_id(&self, id: &str) -> String {
        let Some(first) = self.visible.first() else {
            return String::new();
        };
        if id.is_empty() {
            return first.id.clone();
        }
        match self.visible.iter().position(|m| m.id == id) {
            Some(index) => self.visible[(index + 1) % self.visible.len()].id.clone(),
            None => first.id.clone(),
        }
    }

    /// Id of the visible effect before `id`, wrapping at the start
    ///
    /// An empty or unknown id selects the last visible effect.
    pub fn prev_effect_id(&self, id: &str) -> String {
        let Some(last) = self.visible.last() else {
            return String::new();
        };
        if id.is_empty() {
            return last.id.clone();
        }
        match self.visible.iter().position(|m| m.id == id) {
            Some(0) | None => last.id.clone(),
            Some(index) => self.visible[index - 1].id.clone(),
        }
    }
}
