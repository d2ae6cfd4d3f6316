//! Gain - simple volume control

use crate::effect::{EffectBase, EffectProcessor, ParamValue};
use crate::manifest::{BackendType, EffectManifest, ManifestParameter, ManifestPtr};
use crate::types::StereoBuffer;

pub const GAIN_ID: &str = "mesh.builtin.gain";

/// Manifest of the gain effect
///
/// One knob: 0.0 = silence, 0.5 = unity, 1.0 = +6dB.
pub fn manifest() -> EffectManifest {
    EffectManifest::new(GAIN_ID, BackendType::BuiltIn, "Gain")
        .with_short_name("Gain")
        .with_description("Volume multiplier")
        .with_author("mesh")
        .with_version("1.0")
        .with_param(
            ManifestParameter::new("gain", "Gain", 0.5)
                .with_range(0.0, 2.0)
                .with_unit("×"),
        )
}

pub struct GainEffect {
    base: EffectBase,
}

impl GainEffect {
    pub fn new(manifest: ManifestPtr) -> Self {
        Self {
            base: EffectBase::new(manifest),
        }
    }
}

impl EffectProcessor for GainEffect {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        buffer.scale(self.base.param_actual(0));
    }

    fn manifest(&self) -> &ManifestPtr {
        self.base.manifest()
    }

    fn params(&self) -> &[ParamValue] {
        self.base.params()
    }

    fn set_param(&mut self, index: usize, value: f32) {
        self.base.set_param(index, value);
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_gain_unity_by_default() {
        let mut effect = GainEffect::new(manifest().into_ptr());
        let mut buffer = StereoBuffer::silence(2);
        buffer[0] = StereoSample::new(1.0, 0.5);

        effect.process(&mut buffer);
        assert!((buffer[0].left - 1.0).abs() < 0.001);
        assert!((buffer[0].right - 0.5).abs() < 0.001);
    }

    #[test]
    fn test_gain_half() {
        let mut effect = GainEffect::new(manifest().into_ptr());
        effect.set_param(0, 0.25);

        let mut buffer = StereoBuffer::silence(1);
        buffer[0] = StereoSample::mono(1.0);
        effect.process(&mut buffer);
        assert!((buffer[0].left - 0.5).abs() < 0.001);
    }
}
