//! DJ filter - combined HP/LP filter on one knob

use super::svf::SvfFilter;
use crate::effect::{EffectBase, EffectProcessor, ParamValue};
use crate::manifest::{BackendType, EffectManifest, LinkType, ManifestParameter, ManifestPtr};
use crate::types::StereoBuffer;

pub const FILTER_ID: &str = "mesh.builtin.filter";

/// Dead zone around the center position where the filter is flat
const DEAD_ZONE: f32 = 0.02;

/// Manifest of the DJ filter
///
/// The filter knob follows the chain super knob by default, which makes the
/// filter usable as a quick effect with a single control.
pub fn manifest() -> EffectManifest {
    EffectManifest::new(FILTER_ID, BackendType::BuiltIn, "DJ Filter")
        .with_short_name("Filter")
        .with_description("Low-pass to the left, high-pass to the right")
        .with_author("mesh")
        .with_version("1.0")
        .with_default_meta(0.5)
        .with_param(
            ManifestParameter::new("filter", "Filter", 0.5)
                .with_range(-1.0, 1.0)
                .with_link(LinkType::Linked, false),
        )
        .with_param(
            ManifestParameter::new("resonance", "Resonance", 0.0)
                .with_range(0.5, 10.0)
                .with_unit("Q"),
        )
}

pub struct DjFilterEffect {
    base: EffectBase,
    filter: SvfFilter,
}

impl DjFilterEffect {
    pub fn new(manifest: ManifestPtr) -> Self {
        Self {
            base: EffectBase::new(manifest),
            filter: SvfFilter::new(1000.0, 0.707),
        }
    }

    /// Cutoff for a filter position (-1 to 1)
    fn cutoff(position: f32) -> f32 {
        if position < 0.0 {
            // LP: 20kHz at center down to 100Hz
            100.0 * 200.0_f32.powf(1.0 + position)
        } else {
            // HP: 20Hz at center up to 5kHz
            20.0 * 250.0_f32.powf(position)
        }
    }
}

impl EffectProcessor for DjFilterEffect {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        let position = self.base.param_actual(0);
        if position.abs() < DEAD_ZONE {
            return;
        }

        self.filter
            .set_params(Self::cutoff(position), self.base.param_actual(1));
        let lowpass = position < 0.0;

        for sample in buffer.iter_mut() {
            let out = self.filter.process(sample.left, sample.right);
            let (left, right) = if lowpass { out.low } else { out.high };
            sample.left = left;
            sample.right = right;
        }
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

    fn reset(&mut self) {
        self.filter.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    fn nyquist(len: usize) -> StereoBuffer {
        let mut buffer = StereoBuffer::silence(len);
        for (i, sample) in buffer.iter_mut().enumerate() {
            *sample = StereoSample::mono(if i % 2 == 0 { 1.0 } else { -1.0 });
        }
        buffer
    }

    #[test]
    fn test_flat_at_center() {
        let mut effect = DjFilterEffect::new(manifest().into_ptr());
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(1.0); 64]);
        effect.process(&mut buffer);
        assert!((buffer[32].left - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_lowpass_attenuates_highs() {
        let mut effect = DjFilterEffect::new(manifest().into_ptr());
        effect.set_param(0, 0.0);

        let mut buffer = nyquist(128);
        effect.process(&mut buffer);

        let avg: f32 = buffer.iter().map(|s| s.left.abs()).sum::<f32>() / buffer.len() as f32;
        assert!(avg < 0.5, "LP should attenuate high frequencies");
    }

    #[test]
    fn test_filter_knob_is_linked() {
        let manifest = manifest();
        assert_eq!(manifest.parameters[0].default_link, LinkType::Linked);
        assert_eq!(manifest.parameters[1].default_link, LinkType::None);
    }
}
