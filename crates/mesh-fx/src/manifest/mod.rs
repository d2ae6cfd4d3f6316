//! Effect manifests - immutable descriptors of effect types
//!
//! A manifest is published once by a backend and shared by reference
//! ([`ManifestPtr`]) with every slot that loads it. Identity is the pair
//! (backend type, effect id); everything else is display metadata and the
//! parameter schema.

mod registry;

pub use registry::{alphabetize_manifests, locale_aware_cmp, ManifestRegistry};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Shared, immutable manifest reference
pub type ManifestPtr = Arc<EffectManifest>;

/// Effect backend families
///
/// The declaration order is the catalogue order: builtin effects sort before
/// external plugins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum BackendType {
    /// Native effects compiled into mesh
    #[default]
    BuiltIn,
    /// CLAP plugins
    Clap,
    /// Pure Data patches
    Pd,
}

impl BackendType {
    /// Tag used in unique ids and preset files
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendType::BuiltIn => "BuiltIn",
            BackendType::Clap => "CLAP",
            BackendType::Pd => "PD",
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a backend tag is not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown effect backend '{0}'")]
pub struct UnknownBackendType(pub String);

impl FromStr for BackendType {
    type Err = UnknownBackendType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BuiltIn" => Ok(BackendType::BuiltIn),
            "CLAP" | "Clap" => Ok(BackendType::Clap),
            "PD" | "Pd" => Ok(BackendType::Pd),
            other => Err(UnknownBackendType(other.to_string())),
        }
    }
}

/// Control surface kind of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParameterKind {
    /// Continuous knob (`parameterN` controls)
    #[default]
    Knob,
    /// On/off button (`button_parameterN` controls)
    Button,
}

/// How a parameter follows the chain super knob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LinkType {
    /// Not linked
    #[default]
    None,
    /// Follows the super knob over its whole range
    Linked,
    /// Sweeps over the left half of the super knob, neutral on the right half
    LinkedLeft,
    /// Sweeps over the right half of the super knob, neutral on the left half
    LinkedRight,
}

impl LinkType {
    /// Map a super knob position (0.0-1.0) to a normalized parameter value
    pub fn apply(&self, super_value: f32, inverted: bool) -> Option<f32> {
        let s = super_value.clamp(0.0, 1.0);
        let value = match self {
            LinkType::None => return None,
            LinkType::Linked => s,
            LinkType::LinkedLeft => (s * 2.0).min(1.0),
            LinkType::LinkedRight => ((s - 0.5) * 2.0).max(0.0),
        };
        Some(if inverted { 1.0 - value } else { value })
    }
}

/// Description of one effect parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestParameter {
    /// Stable identifier used in presets
    pub id: String,
    /// Parameter name for display
    pub name: String,
    pub kind: ParameterKind,
    /// Default value (normalized 0.0-1.0)
    pub default: f32,
    /// Display range minimum
    pub min: f32,
    /// Display range maximum
    pub max: f32,
    /// Number of discrete steps (0 = continuous)
    pub steps: u32,
    /// Unit label (e.g., "Hz", "dB")
    pub unit: String,
    /// Default link to the chain super knob
    pub default_link: LinkType,
    pub default_link_inverted: bool,
}

impl ManifestParameter {
    /// Create a knob parameter with id, name and normalized default
    pub fn new(id: impl Into<String>, name: impl Into<String>, default: f32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ParameterKind::Knob,
            default: default.clamp(0.0, 1.0),
            min: 0.0,
            max: 1.0,
            steps: 0,
            unit: String::new(),
            default_link: LinkType::None,
            default_link_inverted: false,
        }
    }

    /// Create a button (on/off) parameter
    pub fn button(id: impl Into<String>, name: impl Into<String>, on: bool) -> Self {
        Self {
            kind: ParameterKind::Button,
            steps: 2,
            ..Self::new(id, name, if on { 1.0 } else { 0.0 })
        }
    }

    /// Set the display range
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Set the unit label
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Set the number of discrete steps
    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    /// Link the parameter to the super knob by default
    pub fn with_link(mut self, link: LinkType, inverted: bool) -> Self {
        self.default_link = link;
        self.default_link_inverted = inverted;
        self
    }

    /// Map a normalized value into the display range
    pub fn actual(&self, normalized: f32) -> f32 {
        let normalized = self.quantize(normalized);
        self.min + normalized * (self.max - self.min)
    }

    /// Clamp and snap a normalized value to the parameter's steps
    pub fn quantize(&self, normalized: f32) -> f32 {
        let normalized = normalized.clamp(0.0, 1.0);
        if self.steps > 1 {
            let last = (self.steps - 1) as f32;
            (normalized * last).round() / last
        } else {
            normalized
        }
    }
}

/// Immutable descriptor of an effect type
#[derive(Debug, Clone, PartialEq)]
pub struct EffectManifest {
    /// Backend-specific effect id (opaque string)
    pub id: String,
    pub backend_type: BackendType,
    /// Full display name
    pub name: String,
    /// Short name for narrow widgets
    pub short_name: String,
    pub description: String,
    pub author: String,
    pub version: String,
    /// Parameter schema in processor order
    pub parameters: Vec<ManifestParameter>,
    /// Default meta (super knob) position for this effect
    pub default_meta: f32,
}

impl EffectManifest {
    /// Create a manifest with the given identity and display name
    pub fn new(id: impl Into<String>, backend_type: BackendType, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            backend_type,
            short_name: name.clone(),
            name,
            description: String::new(),
            author: String::new(),
            version: String::new(),
            parameters: Vec::new(),
            default_meta: 0.5,
        }
    }

    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = short_name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_default_meta(mut self, meta: f32) -> Self {
        self.default_meta = meta.clamp(0.0, 1.0);
        self
    }

    /// Add a parameter to this effect
    pub fn with_param(mut self, param: ManifestParameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// Freeze into a shared pointer
    pub fn into_ptr(self) -> ManifestPtr {
        Arc::new(self)
    }

    /// Name for display ("Filter")
    pub fn display_name(&self) -> &str {
        &self.name
    }

    /// Unique id across backends: `"<id> <backend tag>"`
    pub fn unique_id(&self) -> String {
        format!("{} {}", self.id, self.backend_type)
    }

    /// Identity key for maps
    pub fn key(&self) -> ManifestKey {
        ManifestKey {
            backend_type: self.backend_type,
            id: self.id.clone(),
        }
    }

    /// Whether this manifest has the given identity
    pub fn matches(&self, id: &str, backend_type: BackendType) -> bool {
        self.backend_type == backend_type && self.id == id
    }

    /// Index of a parameter by id
    pub fn parameter_index(&self, id: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.id == id)
    }

    /// Number of parameters
    pub fn param_count(&self) -> usize {
        self.parameters.len()
    }
}

/// Hashable manifest identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ManifestKey {
    pub backend_type: BackendType,
    pub id: String,
}

impl ManifestKey {
    pub fn new(id: impl Into<String>, backend_type: BackendType) -> Self {
        Self {
            backend_type,
            id: id.into(),
        }
    }
}

/// Split a unique id into (effect id, backend type)
///
/// Returns `None` for an empty uid. Ids stored before the backend tag was
/// introduced carry no tag: those resolve to the builtin backend with the
/// whole string as the id.
pub fn parse_unique_id(uid: &str) -> Option<(String, BackendType)> {
    if uid.is_empty() {
        return None;
    }
    if let Some((id, tag)) = uid.rsplit_once(' ') {
        if let Ok(backend_type) = tag.parse::<BackendType>() {
            return Some((id.to_string(), backend_type));
        }
    }
    log::debug!("Effect id '{}' has no backend tag, assuming builtin", uid);
    Some((uid.to_string(), BackendType::BuiltIn))
}
