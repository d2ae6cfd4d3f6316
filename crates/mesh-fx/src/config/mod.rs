//! Effects configuration
//!
//! Chain topology, bridge sizing and default effects, stored as YAML next to
//! the collection like the other mesh configs.
//!
//! ```ignore
//! use mesh_fx::config::{load_config, effects_config_path, default_collection_path, EffectsConfig};
//!
//! let config: EffectsConfig = load_config(&effects_config_path(&default_collection_path()));
//! ```

mod io;
mod paths;

pub use io::{load_config, read_yaml, save_config};
pub use paths::{
    default_collection_path, effects_config_path, effects_folder, CHAINS_FILE, DEFAULTS_FOLDER,
    EFFECTS_FOLDER, PRESETS_FILE,
};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::backend::builtin::{EQUALIZER_ID, FILTER_ID};
use crate::bridge::EFFECTS_QUEUE_CAPACITY;

/// Effects configuration
///
/// Every field has a default, so partial files load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsConfig {
    /// Number of standard effect units
    /// Default: 4
    pub standard_chains: usize,

    /// Slots per standard effect unit
    /// Default: 3
    pub standard_chain_slots: usize,

    /// Slots of the main output chain
    /// Default: 3
    pub output_chain_slots: usize,

    /// Slots of each deck's quick chain
    /// Default: 1
    pub quick_chain_slots: usize,

    /// Slots of each deck's equalizer chain
    /// Default: 1
    pub equalizer_chain_slots: usize,

    /// Whether loading an effect with a preset takes the preset's meta value
    /// instead of the chain's super knob
    /// Default: true
    pub adopt_super_from_preset: bool,

    /// Capacity of each direction of the control/engine bridge
    /// Default: 2048
    pub bridge_capacity: usize,

    /// How long shutdown waits for outstanding engine responses
    /// Default: 500 ms
    pub shutdown_timeout_ms: u64,

    /// Unique id of the effect loaded into new quick chains (empty = none)
    pub default_quick_effect: String,

    /// Unique id of the effect loaded into new equalizer chains (empty = none)
    pub default_equalizer_effect: String,

    /// Unique ids of effects left out of the visible list
    pub hidden_effects: Vec<String>,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            standard_chains: 4,
            standard_chain_slots: 3,
            output_chain_slots: 3,
            quick_chain_slots: 1,
            equalizer_chain_slots: 1,
            adopt_super_from_preset: true,
            bridge_capacity: EFFECTS_QUEUE_CAPACITY,
            shutdown_timeout_ms: 500,
            default_quick_effect: format!("{} BuiltIn", FILTER_ID),
            default_equalizer_effect: format!("{} BuiltIn", EQUALIZER_ID),
            hidden_effects: Vec::new(),
        }
    }
}

impl EffectsConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
