//! Effect and chain presets
//!
//! Presets are plain serializable values. They are read from storage at
//! startup or built from live slot state when saving, and never outlive the
//! operation that produced them, except the default preset cached per
//! manifest by the coordinator.

mod manager;
mod store;

pub use manager::ChainPresetManager;
pub use store::{sanitize_preset_filename, ChainPresetsSnapshot, PresetStore, YamlPresetStore};

use serde::{Deserialize, Serialize};

use crate::chain::{ChainSlot, EffectSlot, MixMode};
use crate::manifest::{BackendType, EffectManifest, LinkType};

/// Saved value of one effect parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectParameterPreset {
    /// Manifest parameter id
    pub id: String,
    /// Normalized value
    pub value: f32,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub link_type: LinkType,
    #[serde(default)]
    pub link_inverted: bool,
}

impl EffectParameterPreset {
    pub fn new(id: impl Into<String>, value: f32) -> Self {
        Self {
            id: id.into(),
            value,
            hidden: false,
            link_type: LinkType::None,
            link_inverted: false,
        }
    }
}

/// Saved state of one effect slot
///
/// An empty id stands for an unloaded slot. Files written before the backend
/// was recorded have no `backend` field and are read as builtin.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectPreset {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub backend: BackendType,
    /// Meta (super) value of the slot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_parameter: Option<f32>,
    /// Parameters in display order
    #[serde(default)]
    pub parameters: Vec<EffectParameterPreset>,
}

impl EffectPreset {
    /// Preset of an unloaded slot
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    /// Default preset derived from a manifest
    pub fn from_manifest(manifest: &EffectManifest) -> Self {
        Self {
            id: manifest.id.clone(),
            backend: manifest.backend_type,
            meta_parameter: Some(manifest.default_meta),
            parameters: manifest
                .parameters
                .iter()
                .map(|p| EffectParameterPreset {
                    link_type: p.default_link,
                    link_inverted: p.default_link_inverted,
                    ..EffectParameterPreset::new(p.id.clone(), p.default)
                })
                .collect(),
        }
    }

    /// Snapshot the current state of a slot (empty if nothing is loaded)
    pub fn from_effect_slot(slot: &EffectSlot) -> Self {
        let Some(manifest) = slot.manifest() else {
            return Self::empty();
        };
        Self {
            id: manifest.id.clone(),
            backend: manifest.backend_type,
            meta_parameter: slot.meta(),
            parameters: slot
                .parameters()
                .iter()
                .map(|p| EffectParameterPreset {
                    id: p.id().to_string(),
                    value: p.value(),
                    hidden: p.is_hidden(),
                    link_type: p.link_type(),
                    link_inverted: p.link_inverted(),
                })
                .collect(),
        }
    }

    /// Whether this preset is for the given manifest
    pub fn matches(&self, manifest: &EffectManifest) -> bool {
        manifest.matches(&self.id, self.backend)
    }
}

fn default_super() -> f32 {
    0.5
}

/// Saved state of a whole chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainPreset {
    pub name: String,
    #[serde(default)]
    pub mix_mode: MixMode,
    #[serde(default = "default_super")]
    pub super_default: f32,
    #[serde(default = "default_super")]
    pub super_value: f32,
    /// One entry per slot; empty entries unload the slot
    #[serde(default)]
    pub effects: Vec<EffectPreset>,
}

impl Default for ChainPreset {
    fn default() -> Self {
        Self {
            name: String::new(),
            mix_mode: MixMode::default(),
            super_default: default_super(),
            super_value: default_super(),
            effects: Vec::new(),
        }
    }
}

impl ChainPreset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Snapshot the current state of a chain
    pub fn from_chain_slot(chain: &ChainSlot) -> Self {
        Self {
            name: chain.preset_name().to_string(),
            mix_mode: chain.mix_mode(),
            super_default: chain.super_parameter_default(),
            super_value: chain.super_parameter(),
            effects: chain.effect_slots().iter().map(EffectPreset::from_effect_slot).collect(),
        }
    }

    pub fn with_effect(mut self, effect: EffectPreset) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_mix_mode(mut self, mix_mode: MixMode) -> Self {
        self.mix_mode = mix_mode;
        self
    }

    pub fn with_super(mut self, value: f32) -> Self {
        self.super_value = value;
        self
    }

    /// Whether every entry is empty
    pub fn is_empty(&self) -> bool {
        self.effects.iter().all(EffectPreset::is_empty)
    }
}
