//! Engine-side effect registry
//!
//! Owned by the audio thread. At the start of every processing quantum it
//! drains the bridge, applies each request to its chain and answers with
//! exactly one response, then runs the chains on audio for that quantum.
//!
//! # Real-Time Safety
//!
//! - The chain table has a fixed length, so installing a chain never grows it
//! - Processors and chains arrive and leave through the bridge; nothing is
//!   allocated or freed here
//! - Nothing is logged; faults are counted and read back by the owner

mod chain;

pub use chain::{EngineChain, EngineSlot};

use crate::bridge::{
    EffectsRequest, EffectsResponse, EngineBridge, RequestId, RequestKind, ResponsePayload,
};
use crate::chain::ChainId;
use crate::channel::ChannelHandle;
use crate::types::StereoBuffer;

/// Maximum number of chains the engine can hold
pub const MAX_ENGINE_CHAINS: usize = 64;

/// Counters of requests the engine could not apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineFaults {
    /// Requests naming a chain that is not installed
    pub unknown_chain: usize,
    /// Requests naming a slot the chain does not have
    pub unknown_slot: usize,
    /// AddChain for an occupied or out-of-range chain id
    pub rejected_chain: usize,
}

/// Audio-thread state of every effect chain
pub struct EngineEffectsRegistry {
    bridge: EngineBridge,
    chains: Vec<Option<Box<EngineChain>>>,
    faults: EngineFaults,
}

impl EngineEffectsRegistry {
    /// Create the registry (control thread, before the audio thread starts)
    pub fn new(bridge: EngineBridge) -> Self {
        Self {
            bridge,
            chains: (0..MAX_ENGINE_CHAINS).map(|_| None).collect(),
            faults: EngineFaults::default(),
        }
    }

    /// Apply every pending request; call once per quantum before processing
    ///
    /// Returns the number of requests applied.
    pub fn on_quantum_start(&mut self) -> usize {
        let mut applied = 0;
        while let Some(request) = self.bridge.pop_request() {
            let response = self.apply(request);
            self.bridge.push_response(response);
            applied += 1;
        }
        applied
    }

    fn apply(&mut self, request: EffectsRequest) -> EffectsResponse {
        let EffectsRequest { id, chain: chain_id, kind } = request;
        let slot = kind.slot();

        if let RequestKind::AddChain(chain) = kind {
            return match self.chains.get_mut(chain_id.index()) {
                Some(entry) if entry.is_none() => {
                    *entry = Some(chain);
                    EffectsResponse::ack(id, chain_id, None, true)
                }
                _ => {
                    self.faults.rejected_chain += 1;
                    EffectsResponse {
                        id,
                        chain: chain_id,
                        slot: None,
                        success: false,
                        payload: ResponsePayload::Chain(chain),
                    }
                }
            };
        }

        let Some(entry) = self.chains.get_mut(chain_id.index()) else {
            self.faults.unknown_chain += 1;
            return Self::refuse(id, chain_id, slot, kind);
        };
        if let RequestKind::RemoveChain = kind {
            return match entry.take() {
                Some(chain) => EffectsResponse {
                    id,
                    chain: chain_id,
                    slot: None,
                    success: true,
                    payload: ResponsePayload::Chain(chain),
                },
                None => {
                    self.faults.unknown_chain += 1;
                    EffectsResponse::ack(id, chain_id, None, false)
                }
            };
        }
        let Some(chain) = entry.as_mut() else {
            self.faults.unknown_chain += 1;
            return Self::refuse(id, chain_id, slot, kind);
        };

        let success = match kind {
            RequestKind::LoadEffect { slot, mut swap } => {
                let success = chain.swap_effect(slot, &mut swap);
                if !success {
                    self.faults.unknown_slot += 1;
                }
                return EffectsResponse {
                    id,
                    chain: chain_id,
                    slot: Some(slot),
                    success,
                    payload: ResponsePayload::Swapped(swap),
                };
            }
            RequestKind::SetEffectParameter {
                slot,
                parameter,
                value,
            } => chain.set_parameter(slot, parameter, value),
            RequestKind::SetEffectEnabled { slot, enabled } => chain.set_slot_enabled(slot, enabled),
            RequestKind::SetChainParameters {
                enabled,
                mix_mode,
                mix,
            } => {
                chain.set_parameters(enabled, mix_mode, mix);
                true
            }
            RequestKind::EnableInputChannel(handle) => {
                chain.inputs_mut().insert(handle);
                true
            }
            RequestKind::DisableInputChannel(handle) => {
                chain.inputs_mut().remove(handle);
                true
            }
            RequestKind::EnableOutputChannel(handle) => {
                chain.outputs_mut().insert(handle);
                true
            }
            RequestKind::DisableOutputChannel(handle) => {
                chain.outputs_mut().remove(handle);
                true
            }
            RequestKind::AddChain(_) | RequestKind::RemoveChain => true,
        };
        if !success && slot.is_some() {
            self.faults.unknown_slot += 1;
        }
        EffectsResponse::ack(id, chain_id, slot, success)
    }

    /// Failed response that still hands back anything the request carried
    fn refuse(
        id: RequestId,
        chain: ChainId,
        slot: Option<usize>,
        kind: RequestKind,
    ) -> EffectsResponse {
        let payload = match kind {
            RequestKind::LoadEffect { swap, .. } => ResponsePayload::Swapped(swap),
            RequestKind::AddChain(chain) => ResponsePayload::Chain(chain),
            _ => ResponsePayload::Ack,
        };
        EffectsResponse {
            id,
            chain,
            slot,
            success: false,
            payload,
        }
    }

    /// Run every chain routed from `input` to `output` over the buffer, in
    /// chain order
    pub fn process(&mut self, input: ChannelHandle, output: ChannelHandle, buffer: &mut StereoBuffer) {
        for chain in self.chains.iter_mut().flatten() {
            if chain.routes(input, output) {
                chain.process(buffer);
            }
        }
    }

    /// Installed chain by id
    pub fn chain(&self, id: ChainId) -> Option<&EngineChain> {
        self.chains.get(id.index()).and_then(|c| c.as_deref())
    }

    /// Number of installed chains
    pub fn chain_count(&self) -> usize {
        self.chains.iter().filter(|c| c.is_some()).count()
    }

    pub fn faults(&self) -> EngineFaults {
        self.faults
    }

    /// Responses the bridge could not deliver
    pub fn dropped_responses(&self) -> usize {
        self.bridge.dropped_responses()
    }

    /// Whether the control side still exists
    pub fn is_control_alive(&self) -> bool {
        self.bridge.is_control_alive()
    }
}
