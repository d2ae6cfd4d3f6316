//! Audio-thread mirror of one effect chain

use crate::bridge::EffectSwap;
use crate::chain::MixMode;
use crate::channel::{ChannelHandle, ChannelMask};
use crate::effect::EffectProcessor;
use crate::manifest::ManifestPtr;
use crate::types::{StereoBuffer, StereoSample, MAX_BUFFER_SIZE};

/// One slot of an engine chain
#[derive(Default)]
pub struct EngineSlot {
    manifest: Option<ManifestPtr>,
    processor: Option<Box<dyn EffectProcessor>>,
    enabled: bool,
}

impl EngineSlot {
    pub fn manifest(&self) -> Option<&ManifestPtr> {
        self.manifest.as_ref()
    }

    pub fn processor(&self) -> Option<&dyn EffectProcessor> {
        self.processor.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// The live processor list of a chain plus its mix state
///
/// Built on the control thread with every buffer pre-allocated, then moved
/// into the engine. The slot count never changes once built.
pub struct EngineChain {
    slots: Vec<EngineSlot>,
    enabled: bool,
    mix_mode: MixMode,
    mix: f32,
    inputs: ChannelMask,
    outputs: ChannelMask,
    /// Copy of the unprocessed input for the dry/wet blend
    dry: StereoBuffer,
}

impl EngineChain {
    pub fn new(slot_count: usize, mix_mode: MixMode, mix: f32) -> Self {
        Self {
            slots: (0..slot_count).map(|_| EngineSlot::default()).collect(),
            enabled: true,
            mix_mode,
            mix: mix.clamp(0.0, 1.0),
            inputs: ChannelMask::EMPTY,
            outputs: ChannelMask::EMPTY,
            dry: StereoBuffer::silence(MAX_BUFFER_SIZE),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot(&self, index: usize) -> Option<&EngineSlot> {
        self.slots.get(index)
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

    /// Whether audio flowing from `input` to `output` passes this chain
    pub fn routes(&self, input: ChannelHandle, output: ChannelHandle) -> bool {
        self.enabled && self.inputs.contains(input) && self.outputs.contains(output)
    }

    /// Exchange the slot's manifest and processor with the swap record
    ///
    /// Seeds the incoming processor with the swap's values. Returns false
    /// for an unknown slot, leaving the record untouched.
    pub(crate) fn swap_effect(&mut self, slot: usize, swap: &mut EffectSwap) -> bool {
        let Some(target) = self.slots.get_mut(slot) else {
            return false;
        };
        std::mem::swap(&mut target.manifest, &mut swap.manifest);
        std::mem::swap(&mut target.processor, &mut swap.processor);
        std::mem::swap(&mut target.enabled, &mut swap.enabled);
        if let Some(processor) = target.processor.as_mut() {
            processor.reset();
            for (index, value) in swap.values.iter().enumerate() {
                processor.set_param(index, *value);
            }
        }
        true
    }

    pub(crate) fn set_parameter(&mut self, slot: usize, parameter: usize, value: f32) -> bool {
        match self.slots.get_mut(slot).and_then(|s| s.processor.as_mut()) {
            Some(processor) => {
                processor.set_param(parameter, value);
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_slot_enabled(&mut self, slot: usize, enabled: bool) -> bool {
        match self.slots.get_mut(slot) {
            Some(target) => {
                target.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_parameters(&mut self, enabled: bool, mix_mode: MixMode, mix: f32) {
        self.enabled = enabled;
        self.mix_mode = mix_mode;
        self.mix = mix.clamp(0.0, 1.0);
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut ChannelMask {
        &mut self.inputs
    }

    pub(crate) fn outputs_mut(&mut self) -> &mut ChannelMask {
        &mut self.outputs
    }

    fn has_active_effects(&self) -> bool {
        self.slots.iter().any(|s| s.enabled && s.processor.is_some())
    }

    /// Run the enabled effects in slot order and blend with the dry signal
    ///
    /// Real-time safe: buffers longer than the pre-allocated dry buffer pass
    /// through unprocessed.
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        if !self.enabled || !self.has_active_effects() || buffer.len() > self.dry.capacity() {
            return;
        }

        self.dry.copy_from(buffer);
        for slot in &mut self.slots {
            if !slot.enabled {
                continue;
            }
            if let Some(processor) = slot.processor.as_mut() {
                processor.process(buffer);
            }
        }

        let mix = self.mix;
        match self.mix_mode {
            MixMode::DryWet => {
                if mix >= 1.0 {
                    return;
                }
                for (wet, dry) in buffer.iter_mut().zip(self.dry.iter()) {
                    *wet = *dry * (1.0 - mix) + *wet * mix;
                }
            }
            MixMode::DryPlusWet => {
                // The wet signal is what the effects added on top of dry
                for (wet, dry) in buffer.iter_mut().zip(self.dry.iter()) {
                    let added = StereoSample::new(wet.left - dry.left, wet.right - dry.right);
                    *wet = *dry + added * mix;
                }
            }
        }
    }
}
