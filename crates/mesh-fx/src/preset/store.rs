//! Preset persistence
//!
//! The coordinator only talks to [`PresetStore`]; [`YamlPresetStore`] keeps
//! everything as YAML under the collection's `effects/` folder:
//!
//! ```text
//! effects/
//! ├── chains.yaml              # chain state restored at startup
//! ├── presets.yaml             # saved chain-preset library
//! └── defaults/
//!     └── <effect id>.yaml     # default preset per effect
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::{ChainPreset, EffectPreset};
use crate::config::{load_config, read_yaml, save_config, CHAINS_FILE, DEFAULTS_FOLDER, PRESETS_FILE};

/// Chain state as persisted between sessions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainPresetsSnapshot {
    /// Standard effect units, by position
    pub standard: Vec<ChainPreset>,
    /// Output chain
    pub output: Option<ChainPreset>,
    /// Quick chains by deck group
    pub quick: BTreeMap<String, ChainPreset>,
    /// Equalizer chains by deck group
    pub equalizer: BTreeMap<String, ChainPreset>,
}

/// Saved chain-preset library file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct PresetLibraryFile {
    presets: Vec<ChainPreset>,
}

/// Storage for chain state, the preset library and default presets
pub trait PresetStore: Send {
    /// Persisted chain state; per-deck entries only for the given decks
    fn load_chain_presets(&self, deck_groups: &[String]) -> ChainPresetsSnapshot;

    fn save_chain_presets(&self, snapshot: &ChainPresetsSnapshot) -> Result<()>;

    /// Saved chain presets in user order
    fn load_preset_library(&self) -> Vec<ChainPreset>;

    fn save_preset_library(&self, presets: &[ChainPreset]) -> Result<()>;

    /// Every readable default preset; unreadable ones are skipped
    fn load_default_presets(&self) -> Vec<EffectPreset>;

    /// Store (or overwrite) the default preset of one effect
    fn save_default_preset(&self, preset: &EffectPreset) -> Result<()>;
}

/// File name for an effect's default preset
///
/// Path separators become dashes and characters that are invalid in file
/// names on common systems are dropped.
pub fn sanitize_preset_filename(id: &str) -> String {
    id.chars()
        .filter_map(|c| match c {
            '/' => Some('-'),
            '<' | '>' | ':' | '"' | '\'' | '|' | '?' | '*' | '\\' => None,
            c => Some(c),
        })
        .collect()
}

/// YAML files under one folder
#[derive(Debug, Clone)]
pub struct YamlPresetStore {
    root: PathBuf,
}

impl YamlPresetStore {
    /// Store rooted at `root` (normally `{collection}/effects`)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn defaults_folder(&self) -> PathBuf {
        self.root.join(DEFAULTS_FOLDER)
    }

    pub fn default_preset_path(&self, id: &str) -> PathBuf {
        self.defaults_folder()
            .join(format!("{}.yaml", sanitize_preset_filename(id)))
    }
}

impl PresetStore for YamlPresetStore {
    fn load_chain_presets(&self, deck_groups: &[String]) -> ChainPresetsSnapshot {
        let mut snapshot: ChainPresetsSnapshot = load_config(&self.root.join(CHAINS_FILE));
        snapshot.quick.retain(|deck, _| deck_groups.contains(deck));
        snapshot.equalizer.retain(|deck, _| deck_groups.contains(deck));
        snapshot
    }

    fn save_chain_presets(&self, snapshot: &ChainPresetsSnapshot) -> Result<()> {
        save_config(snapshot, &self.root.join(CHAINS_FILE)).context("Failed to save effect chains")
    }

    fn load_preset_library(&self) -> Vec<ChainPreset> {
        let library: PresetLibraryFile = load_config(&self.root.join(PRESETS_FILE));
        library.presets
    }

    fn save_preset_library(&self, presets: &[ChainPreset]) -> Result<()> {
        let library = PresetLibraryFile {
            presets: presets.to_vec(),
        };
        save_config(&library, &self.root.join(PRESETS_FILE)).context("Failed to save chain presets")
    }

    fn load_default_presets(&self) -> Vec<EffectPreset> {
        let folder = self.defaults_folder();
        let Ok(entries) = std::fs::read_dir(&folder) else {
            log::info!("No default effect presets in {:?}", folder);
            return Vec::new();
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "yaml"))
            .collect();
        paths.sort();

        paths
            .into_iter()
            .filter_map(|path| match read_yaml::<EffectPreset>(&path) {
                Ok(preset) if !preset.is_empty() => Some(preset),
                Ok(_) => {
                    log::warn!("Skipping default preset {:?}: no effect id", path);
                    None
                }
                Err(e) => {
                    log::warn!("Skipping default preset: {:#}", e);
                    None
                }
            })
            .collect()
    }

    fn save_default_preset(&self, preset: &EffectPreset) -> Result<()> {
        save_config(preset, &self.default_preset_path(&preset.id))
            .with_context(|| format!("Failed to save default preset for '{}'", preset.id))
    }
}
