//! Mesh FX - Effect chain coordination for the DJ player
//!
//! Keeps the user-editable description of the effect racks (which effect sits
//! in which slot, its parameters, mix mode and super knob) consistent between
//! the control thread and the real-time audio thread.
//!
//! - [`coordinator::EffectsCoordinator`]: owns backends, manifests, chain slots
//!   and default presets on the control side
//! - [`bridge`]: the two lock-free queues that are the only path across threads
//! - [`engine::EngineEffectsRegistry`]: the audio-thread mirror of every chain,
//!   applying requests between buffers and running the effects

#[macro_use]
mod verify;

pub mod backend;
pub mod bridge;
pub mod chain;
pub mod channel;
pub mod config;
pub mod coordinator;
pub mod effect;
pub mod engine;
pub mod error;
pub mod events;
pub mod group;
pub mod manifest;
pub mod preset;
pub mod types;

#[cfg(test)]
mod testing;

pub use chain::{ChainId, ChainKind, ChainSlot, EffectSlot, MixMode, ParameterSlot};
pub use coordinator::EffectsCoordinator;
pub use engine::EngineEffectsRegistry;
pub use error::{EffectsError, EffectsResult};
pub use manifest::{BackendType, EffectManifest, ManifestPtr};
pub use preset::{ChainPreset, EffectPreset};
pub use types::*;
