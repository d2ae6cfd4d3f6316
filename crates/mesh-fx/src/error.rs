//! Error types for effect chain coordination
//!
//! Control-side operations return [`EffectsError`]. Nothing here is ever
//! constructed on the audio thread.

use thiserror::Error;

use crate::manifest::BackendType;

/// Errors that can occur while coordinating effect chains
#[derive(Debug, Error)]
pub enum EffectsError {
    /// No chain slot with this group name
    #[error("Unknown effect chain '{0}'")]
    UnknownChain(String),

    /// Slot index outside the chain's fixed slot count
    #[error("Slot index {index} out of range for chain '{chain}' ({count} slots)")]
    SlotOutOfRange {
        chain: String,
        index: usize,
        count: usize,
    },

    /// No backend of this type is registered
    #[error("Effect backend {0} is not registered")]
    UnknownBackend(BackendType),

    /// No manifest with this identity
    #[error("Effect manifest '{id}' not found for backend {backend}")]
    ManifestNotFound { id: String, backend: BackendType },

    /// Backend knows the manifest but could not create a processor
    #[error("Backend {backend} failed to instantiate '{id}'")]
    InstantiationFailed { id: String, backend: BackendType },

    /// No chain preset with this name or index
    #[error("Chain preset '{0}' not found")]
    PresetNotFound(String),

    /// A slot request was refused by the bridge (the cause is logged)
    #[error("Request for '{0}' was not sent to the engine")]
    RequestNotSent(String),

    /// Request could not cross the bridge
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Composite group key did not parse
    #[error(transparent)]
    GroupKey(#[from] GroupKeyError),

    /// Persistence failure
    #[error("Persistence error: {0}")]
    Persistence(#[from] anyhow::Error),
}

/// Result type for effect coordination
pub type EffectsResult<T> = Result<T, EffectsError>;

/// Failures sending a request to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Request queue is full; the request was dropped
    #[error("Effects request queue full ({capacity} slots)")]
    QueueFull { capacity: usize },

    /// Shutdown started; only teardown requests are accepted
    #[error("Effects bridge is shutting down")]
    ShuttingDown,

    /// The engine side of the bridge was dropped
    #[error("Effects engine is gone")]
    EngineGone,
}

/// Malformed composite control key
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GroupKeyError {
    #[error("Malformed effect slot group '{0}'")]
    MalformedGroup(String),

    #[error("Unknown effect rack in group '{0}'")]
    UnknownRack(String),

    #[error("Malformed parameter key '{0}'")]
    MalformedParameter(String),
}
