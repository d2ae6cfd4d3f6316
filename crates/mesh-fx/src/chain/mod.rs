//! Chain slots - control-side representation of effect chains
//!
//! A [`ChainSlot`] owns a fixed number of [`EffectSlot`]s plus chain-level
//! state (mix, super knob, bound preset, channel registrations). Every
//! change that affects audio is packaged as a request and sent through the
//! [`ControlBridge`]; the engine mirror is never read directly.
//!
//! The four chain variants differ only in the [`ChainConfig`] their
//! [`ChainKind`] returns.

mod effect_slot;
mod kind;
mod parameter;

pub use effect_slot::{EffectSlot, SlotState};
pub use kind::{
    effect_slot_group, ChainConfig, ChainKind, ChannelPolicy, MixControl, EQUALIZER_RACK,
    GROUP_SEPARATOR, OUTPUT_RACK, QUICK_RACK, STANDARD_RACK,
};
pub use parameter::ParameterSlot;
pub(crate) use kind::parse_one_based;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::bridge::{ControlBridge, EffectsResponse, RequestKind};
use crate::channel::{ChannelHandle, ChannelHandleAndGroup};
use crate::effect::EffectProcessor;
use crate::engine::EngineChain;
use crate::manifest::{ManifestPtr, ParameterKind};
use crate::preset::EffectPreset;

/// Identity of a chain on both sides of the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainId(usize);

impl ChainId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How the processed signal is blended with the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MixMode {
    /// Linear crossfade: `dry * (1 - mix) + wet * mix`
    #[default]
    DryWet,
    /// Additive: `dry + (wet - dry) * mix`
    DryPlusWet,
}

/// Default super knob position of new chains
pub const DEFAULT_SUPER_PARAMETER: f32 = 0.5;

#[derive(Debug, Clone)]
struct RegisteredChannel {
    handle: ChannelHandle,
    enabled: bool,
}

/// Control-side state of one effect chain
pub struct ChainSlot {
    id: ChainId,
    kind: ChainKind,
    group: String,
    config: ChainConfig,
    slots: Vec<EffectSlot>,
    enabled: bool,
    mix_mode: MixMode,
    mix: f32,
    super_parameter: f32,
    super_default: f32,
    preset_name: String,
    loaded_preset_index: Option<usize>,
    inputs: BTreeMap<String, RegisteredChannel>,
    outputs: BTreeMap<String, RegisteredChannel>,
}

impl ChainSlot {
    pub(crate) fn new(id: ChainId, kind: ChainKind, slot_count: usize) -> Self {
        let group = kind.group();
        let config = kind.config();
        let slots = (0..slot_count).map(|i| EffectSlot::new(&group, i)).collect();
        Self {
            id,
            group,
            config,
            kind,
            slots,
            enabled: true,
            mix_mode: MixMode::DryWet,
            mix: 1.0,
            super_parameter: DEFAULT_SUPER_PARAMETER,
            super_default: DEFAULT_SUPER_PARAMETER,
            preset_name: String::new(),
            loaded_preset_index: None,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Engine mirror to install with the chain (built here so the audio
    /// thread never allocates)
    pub(crate) fn engine_chain(&self) -> Box<EngineChain> {
        Box::new(EngineChain::new(self.slots.len(), self.mix_mode, self.mix))
    }

    pub fn id(&self) -> ChainId {
        self.id
    }

    pub fn kind(&self) -> &ChainKind {
        &self.kind
    }

    /// Unique group name, e.g. `[EffectRack1_EffectUnit1]`
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn config(&self) -> ChainConfig {
        self.config
    }

    /// Fixed number of effect slots
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Effect slot by index; `None` when out of range
    pub fn effect_slot(&self, index: usize) -> Option<&EffectSlot> {
        self.slots.get(index)
    }

    pub fn effect_slots(&self) -> &[EffectSlot] {
        &self.slots
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn mix_mode(&self) -> MixMode {
        self.mix_mode
    }

    pub fn mix(&self) -> f32 {
        self.mix
    }

    pub fn super_parameter(&self) -> f32 {
        self.super_parameter
    }

    pub fn super_parameter_default(&self) -> f32 {
        self.super_default
    }

    /// Name of the preset the chain was last loaded from
    pub fn preset_name(&self) -> &str {
        &self.preset_name
    }

    /// Library index of the preset the chain matches, if any
    pub fn loaded_preset_index(&self) -> Option<usize> {
        self.loaded_preset_index
    }

    pub(crate) fn set_preset_name(&mut self, name: impl Into<String>) {
        self.preset_name = name.into();
    }

    pub(crate) fn set_loaded_preset_index(&mut self, index: Option<usize>) {
        self.loaded_preset_index = index;
    }

    /// Whether any slot is waiting for the engine
    pub fn has_pending_requests(&self) -> bool {
        self.slots
            .iter()
            .any(|s| s.state() == SlotState::Transitioning || s.has_deferred_load())
    }

    fn verify_slot(&self, index: usize) -> bool {
        verify_or_debug_assert!(
            index < self.slots.len(),
            "slot {} out of range for {} ({} slots)",
            index,
            self.group,
            self.slots.len()
        )
    }

    /// Load an effect into a slot, or unload it with `manifest == None`
    ///
    /// Unbinds the chain from its library preset.
    pub(crate) fn load_effect(
        &mut self,
        bridge: &mut ControlBridge,
        index: usize,
        manifest: Option<ManifestPtr>,
        processor: Option<Box<dyn EffectProcessor>>,
        preset: Option<&EffectPreset>,
        adopt_super: bool,
    ) -> bool {
        if !self.verify_slot(index) {
            return false;
        }
        self.loaded_preset_index = None;
        let (id, chain_super) = (self.id, self.super_parameter);
        self.slots[index].load(bridge, id, manifest, processor, preset, chain_super, adopt_super)
    }

    /// Unload every slot
    pub(crate) fn clear(&mut self, bridge: &mut ControlBridge) {
        for index in 0..self.slots.len() {
            self.load_effect(bridge, index, None, None, None, false);
        }
    }

    fn send_chain_parameters(&self, bridge: &mut ControlBridge) {
        let kind = RequestKind::SetChainParameters {
            enabled: self.enabled,
            mix_mode: self.mix_mode,
            mix: self.mix,
        };
        if let Err(err) = bridge.send(self.id, kind) {
            log::warn!("Chain parameters for {} not sent: {}", self.group, err);
        }
    }

    fn mix_is_fixed(&self, what: &str) -> bool {
        if self.config.mix == MixControl::Fixed {
            log::debug!("Ignoring {} change on {}: mix is fixed", what, self.group);
            return true;
        }
        false
    }

    pub(crate) fn set_mix_mode(&mut self, bridge: &mut ControlBridge, mix_mode: MixMode) -> bool {
        if self.mix_is_fixed("mix mode") {
            return false;
        }
        if self.mix_mode != mix_mode {
            self.mix_mode = mix_mode;
            self.send_chain_parameters(bridge);
        }
        true
    }

    pub(crate) fn set_mix(&mut self, bridge: &mut ControlBridge, mix: f32) -> bool {
        if self.mix_is_fixed("mix amount") {
            return false;
        }
        if !verify_or_debug_assert!(!mix.is_nan(), "NaN mix amount for {}", self.group) {
            return false;
        }
        let mix = mix.clamp(0.0, 1.0);
        if self.mix != mix {
            self.mix = mix;
            self.send_chain_parameters(bridge);
        }
        true
    }

    pub(crate) fn set_enabled(&mut self, bridge: &mut ControlBridge, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.send_chain_parameters(bridge);
        }
    }

    /// Move the super knob; every slot's meta value follows
    pub(crate) fn set_super_parameter(&mut self, bridge: &mut ControlBridge, value: f32) {
        if !verify_or_debug_assert!(!value.is_nan(), "NaN super parameter for {}", self.group) {
            return;
        }
        self.super_parameter = value.clamp(0.0, 1.0);
        let id = self.id;
        for slot in &mut self.slots {
            slot.set_meta(bridge, id, self.super_parameter, false);
        }
    }

    /// Set the super knob without touching the slots (preset restore)
    pub(crate) fn restore_super_parameter(&mut self, value: f32) {
        self.super_parameter = value.clamp(0.0, 1.0);
    }

    pub(crate) fn set_super_parameter_default(&mut self, value: f32) {
        self.super_default = value.clamp(0.0, 1.0);
    }

    /// Move one slot's meta knob
    pub(crate) fn set_effect_meta(&mut self, bridge: &mut ControlBridge, index: usize, meta: f32) -> bool {
        if !self.verify_slot(index) || !verify_or_debug_assert!(!meta.is_nan(), "NaN meta for {}", self.group) {
            return false;
        }
        let id = self.id;
        self.slots[index].set_meta(bridge, id, meta, false);
        true
    }

    pub(crate) fn set_effect_enabled(&mut self, bridge: &mut ControlBridge, index: usize, enabled: bool) -> bool {
        if !self.verify_slot(index) {
            return false;
        }
        let id = self.id;
        self.slots[index].set_enabled(bridge, id, enabled)
    }

    /// Set the nth shown parameter of a kind in a slot
    pub(crate) fn set_parameter(
        &mut self,
        bridge: &mut ControlBridge,
        index: usize,
        kind: ParameterKind,
        n: usize,
        value: f32,
    ) -> bool {
        if !self.verify_slot(index) {
            return false;
        }
        let id = self.id;
        self.slots[index].set_parameter(bridge, id, kind, n, value)
    }

    pub(crate) fn hide_parameter(&mut self, index: usize, kind: ParameterKind, n: usize) -> bool {
        self.verify_slot(index) && self.slots[index].hide_parameter(kind, n)
    }

    pub(crate) fn show_parameter(&mut self, index: usize, kind: ParameterKind, n: usize) -> bool {
        self.verify_slot(index) && self.slots[index].show_parameter(kind, n)
    }

    // --- Channels ---

    /// Make an input channel available to this chain (not yet enabled)
    pub(crate) fn register_input_channel(&mut self, channel: &ChannelHandleAndGroup) -> bool {
        Self::register(&self.group, &mut self.inputs, channel, "input")
    }

    pub(crate) fn register_output_channel(&mut self, channel: &ChannelHandleAndGroup) -> bool {
        Self::register(&self.group, &mut self.outputs, channel, "output")
    }

    fn register(
        group: &str,
        channels: &mut BTreeMap<String, RegisteredChannel>,
        channel: &ChannelHandleAndGroup,
        direction: &str,
    ) -> bool {
        if !verify_or_debug_assert!(
            !channels.contains_key(&channel.group),
            "{} channel {} already registered on {}",
            direction,
            channel.group,
            group
        ) {
            return false;
        }
        channels.insert(
            channel.group.clone(),
            RegisteredChannel {
                handle: channel.handle,
                enabled: false,
            },
        );
        true
    }

    pub(crate) fn enable_input_channel(&mut self, bridge: &mut ControlBridge, group: &str) -> bool {
        self.set_channel_enabled(bridge, group, true, true)
    }

    pub(crate) fn disable_input_channel(&mut self, bridge: &mut ControlBridge, group: &str) -> bool {
        self.set_channel_enabled(bridge, group, true, false)
    }

    pub(crate) fn enable_output_channel(&mut self, bridge: &mut ControlBridge, group: &str) -> bool {
        self.set_channel_enabled(bridge, group, false, true)
    }

    pub(crate) fn disable_output_channel(&mut self, bridge: &mut ControlBridge, group: &str) -> bool {
        self.set_channel_enabled(bridge, group, false, false)
    }

    fn set_channel_enabled(&mut self, bridge: &mut ControlBridge, group: &str, input: bool, enabled: bool) -> bool {
        let channels = if input { &mut self.inputs } else { &mut self.outputs };
        let registered = channels.get_mut(group);
        if !verify_or_debug_assert!(
            registered.is_some(),
            "channel {} is not registered on {}",
            group,
            self.group
        ) {
            return false;
        }
        let Some(channel) = registered else {
            return false;
        };
        if channel.enabled == enabled {
            return true;
        }

        let kind = match (input, enabled) {
            (true, true) => RequestKind::EnableInputChannel(channel.handle),
            (true, false) => RequestKind::DisableInputChannel(channel.handle),
            (false, true) => RequestKind::EnableOutputChannel(channel.handle),
            (false, false) => RequestKind::DisableOutputChannel(channel.handle),
        };
        match bridge.send(self.id, kind) {
            Ok(_) => {
                channel.enabled = enabled;
                true
            }
            Err(err) => {
                log::warn!("Channel {} change for {} not sent: {}", group, self.group, err);
                false
            }
        }
    }

    pub fn is_input_registered(&self, group: &str) -> bool {
        self.inputs.contains_key(group)
    }

    pub fn is_input_enabled(&self, group: &str) -> bool {
        self.inputs.get(group).is_some_and(|c| c.enabled)
    }

    pub fn is_output_enabled(&self, group: &str) -> bool {
        self.outputs.get(group).is_some_and(|c| c.enabled)
    }

    /// Registered input channel groups
    pub fn registered_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    pub fn registered_outputs(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(String::as_str)
    }

    /// Route a response to the slot it belongs to
    pub(crate) fn on_response(&mut self, bridge: &mut ControlBridge, response: EffectsResponse) {
        let id = self.id;
        match response.slot.and_then(|index| self.slots.get_mut(index)) {
            Some(slot) => {
                let (request, success) = (response.id, response.success);
                if !slot.on_response(bridge, id, response) && !success {
                    log::warn!("Engine refused request #{} for {}", request.0, slot.group());
                }
            }
            None if !response.success => {
                log::warn!("Engine refused request #{} for {}", response.id.0, self.group);
            }
            None => {}
        }
    }
}

impl fmt::Debug for ChainSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainSlot")
            .field("id", &self.id)
            .field("group", &self.group)
            .field("slots", &self.slots)
            .field("mix_mode", &self.mix_mode)
            .field("super_parameter", &self.super_parameter)
            .field("preset_name", &self.preset_name)
            .finish()
    }
}
