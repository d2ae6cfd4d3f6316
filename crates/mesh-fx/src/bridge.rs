//! Lock-free control <-> engine bridge for effect chains
//!
//! Two `rtrb` ringbuffers, one per direction, are the only path by which
//! chain and slot changes cross the thread boundary:
//!
//! ```text
//!  control thread                                   audio thread
//! ┌────────────────┐   EffectsRequest (FIFO)    ┌──────────────────────┐
//! │ ControlBridge  │ ─────────────────────────► │ EngineBridge         │
//! │                │ ◄───────────────────────── │ (EngineEffectsReg.)  │
//! └────────────────┘   EffectsResponse (FIFO)   └──────────────────────┘
//! ```
//!
//! Everything sent is moved: processors and whole engine chains travel in a
//! request and come back in the matching response, so allocation and
//! deallocation always happen on the control side.
//!
//! # Overflow
//!
//! The queues are sized far beyond the number of structural changes a user
//! can issue between two buffers. A request that does not fit is dropped,
//! reported as [`BridgeError::QueueFull`] and logged at error level; the
//! caller leaves its own state untouched so control and engine stay in sync.
//! The engine only takes a request when there is room for its response, so
//! responses are never dropped.

use crate::chain::{ChainId, MixMode};
use crate::channel::ChannelHandle;
use crate::effect::EffectProcessor;
use crate::engine::EngineChain;
use crate::error::BridgeError;
use crate::manifest::ManifestPtr;

/// Default capacity of each direction
pub const EFFECTS_QUEUE_CAPACITY: usize = 2048;

/// Sequence number of a request, echoed by its response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

/// Everything that changes when an effect slot is (re)loaded
///
/// Travels to the engine holding the new manifest, processor and initial
/// parameter values, and comes back holding the previous manifest and
/// processor. `manifest == None` unloads the slot.
pub struct EffectSwap {
    pub manifest: Option<ManifestPtr>,
    pub processor: Option<Box<dyn EffectProcessor>>,
    /// Initial normalized parameter values in manifest order
    pub values: Vec<f32>,
    pub enabled: bool,
}

impl EffectSwap {
    /// Swap record that loads `processor`
    pub fn load(
        manifest: ManifestPtr,
        processor: Box<dyn EffectProcessor>,
        values: Vec<f32>,
        enabled: bool,
    ) -> Self {
        Self {
            manifest: Some(manifest),
            processor: Some(processor),
            values,
            enabled,
        }
    }

    /// Swap record that empties the slot
    pub fn unload() -> Self {
        Self {
            manifest: None,
            processor: None,
            values: Vec::new(),
            enabled: false,
        }
    }
}

impl std::fmt::Debug for EffectSwap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectSwap")
            .field("manifest", &self.manifest.as_ref().map(|m| m.unique_id()))
            .field("processor", &self.processor.is_some())
            .field("values", &self.values)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// What a request asks the engine to do
///
/// Large payloads are boxed to keep the enum small for the ringbuffer.
pub enum RequestKind {
    /// Install a fully built chain (buffers already allocated)
    AddChain(Box<EngineChain>),
    /// Take the chain out of the engine; the response carries it back
    RemoveChain,
    /// Swap the manifest and processor at a slot
    LoadEffect { slot: usize, swap: Box<EffectSwap> },
    SetEffectParameter {
        slot: usize,
        parameter: usize,
        value: f32,
    },
    SetEffectEnabled { slot: usize, enabled: bool },
    SetChainParameters {
        enabled: bool,
        mix_mode: MixMode,
        mix: f32,
    },
    EnableInputChannel(ChannelHandle),
    DisableInputChannel(ChannelHandle),
    EnableOutputChannel(ChannelHandle),
    DisableOutputChannel(ChannelHandle),
}

impl RequestKind {
    /// Requests still accepted once shutdown started
    fn is_teardown(&self) -> bool {
        matches!(self, RequestKind::RemoveChain)
    }

    /// Target slot, for requests addressing one
    pub fn slot(&self) -> Option<usize> {
        match self {
            RequestKind::LoadEffect { slot, .. }
            | RequestKind::SetEffectParameter { slot, .. }
            | RequestKind::SetEffectEnabled { slot, .. } => Some(*slot),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            RequestKind::AddChain(_) => "AddChain",
            RequestKind::RemoveChain => "RemoveChain",
            RequestKind::LoadEffect { .. } => "LoadEffect",
            RequestKind::SetEffectParameter { .. } => "SetEffectParameter",
            RequestKind::SetEffectEnabled { .. } => "SetEffectEnabled",
            RequestKind::SetChainParameters { .. } => "SetChainParameters",
            RequestKind::EnableInputChannel(_) => "EnableInputChannel",
            RequestKind::DisableInputChannel(_) => "DisableInputChannel",
            RequestKind::EnableOutputChannel(_) => "EnableOutputChannel",
            RequestKind::DisableOutputChannel(_) => "DisableOutputChannel",
        }
    }
}

impl std::fmt::Debug for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.slot() {
            Some(slot) => write!(f, "{}(slot {})", self.name(), slot),
            None => f.write_str(self.name()),
        }
    }
}

/// A change sent from the control thread to the engine
#[derive(Debug)]
pub struct EffectsRequest {
    pub id: RequestId,
    pub chain: ChainId,
    pub kind: RequestKind,
}

/// What comes back with a response
pub enum ResponsePayload {
    /// Nothing to hand back
    Ack,
    /// The swap record, now holding the previous manifest and processor
    Swapped(Box<EffectSwap>),
    /// A chain removed from (or refused by) the engine
    Chain(Box<EngineChain>),
}

impl std::fmt::Debug for ResponsePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponsePayload::Ack => f.write_str("Ack"),
            ResponsePayload::Swapped(swap) => f.debug_tuple("Swapped").field(swap).finish(),
            ResponsePayload::Chain(_) => f.write_str("Chain"),
        }
    }
}

/// Engine answer to exactly one request
#[derive(Debug)]
pub struct EffectsResponse {
    pub id: RequestId,
    pub chain: ChainId,
    pub slot: Option<usize>,
    /// False when the engine could not apply the request
    pub success: bool,
    pub payload: ResponsePayload,
}

impl EffectsResponse {
    pub(crate) fn ack(request_id: RequestId, chain: ChainId, slot: Option<usize>, success: bool) -> Self {
        Self {
            id: request_id,
            chain,
            slot,
            success,
            payload: ResponsePayload::Ack,
        }
    }
}

/// Control-thread end of the bridge
pub struct ControlBridge {
    requests: rtrb::Producer<EffectsRequest>,
    responses: rtrb::Consumer<EffectsResponse>,
    capacity: usize,
    next_id: u64,
    outstanding: usize,
    shutting_down: bool,
    dropped_requests: usize,
}

impl ControlBridge {
    /// Send a request; the value is moved and never touched again
    pub fn send(&mut self, chain: ChainId, kind: RequestKind) -> Result<RequestId, BridgeError> {
        if self.shutting_down && !kind.is_teardown() {
            log::debug!("Refusing {:?} for chain {}: bridge shutting down", kind, chain);
            return Err(BridgeError::ShuttingDown);
        }
        if self.requests.is_abandoned() {
            return Err(BridgeError::EngineGone);
        }

        let id = RequestId(self.next_id);
        log::debug!("Effects request #{} {:?} -> chain {}", id.0, kind, chain);
        match self.requests.push(EffectsRequest { id, chain, kind }) {
            Ok(()) => {
                self.next_id += 1;
                self.outstanding += 1;
                Ok(id)
            }
            Err(rtrb::PushError::Full(dropped)) => {
                self.dropped_requests += 1;
                log::error!(
                    "Effects request queue full ({} slots), dropped {:?} for chain {}",
                    self.capacity,
                    dropped.kind,
                    chain
                );
                Err(BridgeError::QueueFull {
                    capacity: self.capacity,
                })
            }
        }
    }

    /// Take the next response, if any
    pub fn pop_response(&mut self) -> Option<EffectsResponse> {
        let response = self.responses.pop().ok()?;
        self.outstanding = self.outstanding.saturating_sub(1);
        Some(response)
    }

    /// Stop accepting anything but teardown requests
    pub fn start_shutdown(&mut self) {
        self.shutting_down = true;
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    /// Requests sent but not yet answered
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Whether the engine end still exists
    pub fn is_engine_alive(&self) -> bool {
        !self.responses.is_abandoned()
    }

    /// Requests dropped because the queue was full
    pub fn dropped_requests(&self) -> usize {
        self.dropped_requests
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Audio-thread end of the bridge
pub struct EngineBridge {
    requests: rtrb::Consumer<EffectsRequest>,
    responses: rtrb::Producer<EffectsResponse>,
    stalls: usize,
    dropped_responses: usize,
}

impl EngineBridge {
    /// Take the next request if there is room to answer it (wait-free)
    pub fn pop_request(&mut self) -> Option<EffectsRequest> {
        if self.requests.is_empty() {
            return None;
        }
        if self.responses.slots() == 0 {
            self.stalls += 1;
            return None;
        }
        self.requests.pop().ok()
    }

    /// Answer a request (wait-free)
    pub fn push_response(&mut self, response: EffectsResponse) {
        if self.responses.push(response).is_err() {
            self.dropped_responses += 1;
        }
    }

    /// Quanta in which draining stopped because the response queue was full
    pub fn stalls(&self) -> usize {
        self.stalls
    }

    pub fn dropped_responses(&self) -> usize {
        self.dropped_responses
    }

    /// Whether the control end still exists
    pub fn is_control_alive(&self) -> bool {
        !self.requests.is_abandoned()
    }
}

/// Create a bridge with `capacity` slots in each direction
pub fn effects_bridge(capacity: usize) -> (ControlBridge, EngineBridge) {
    let capacity = capacity.max(1);
    let (request_tx, request_rx) = rtrb::RingBuffer::new(capacity);
    let (response_tx, response_rx) = rtrb::RingBuffer::new(capacity);
    (
        ControlBridge {
            requests: request_tx,
            responses: response_rx,
            capacity,
            next_id: 0,
            outstanding: 0,
            shutting_down: false,
            dropped_requests: 0,
        },
        EngineBridge {
            requests: request_rx,
            responses: response_tx,
            stalls: 0,
            dropped_responses: 0,
        },
    )
}
