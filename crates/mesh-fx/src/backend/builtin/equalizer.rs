//! Three-band equalizer with kill-capable gains

use super::svf::SvfFilter;
use crate::effect::{EffectBase, EffectProcessor, ParamValue};
use crate::manifest::{BackendType, EffectManifest, ManifestParameter, ManifestPtr};
use crate::types::StereoBuffer;

pub const EQUALIZER_ID: &str = "mesh.builtin.equalizer";

/// Crossover between low and mid bands
const LOW_MID_HZ: f32 = 250.0;
/// Crossover between mid and high bands
const MID_HIGH_HZ: f32 = 2500.0;

/// Manifest of the equalizer
///
/// Band gains map 0.0 = kill, 0.5 = unity, 1.0 = +6dB (x2). Each band also
/// has a kill button.
pub fn manifest() -> EffectManifest {
    let band = |id: &str, name: &str| {
        ManifestParameter::new(id, name, 0.5)
            .with_range(0.0, 2.0)
            .with_unit("×")
    };
    EffectManifest::new(EQUALIZER_ID, BackendType::BuiltIn, "Equalizer")
        .with_short_name("EQ")
        .with_description("Three-band DJ equalizer")
        .with_author("mesh")
        .with_version("1.0")
        .with_param(band("low", "Low"))
        .with_param(band("mid", "Mid"))
        .with_param(band("high", "High"))
        .with_param(ManifestParameter::button("kill_low", "Kill Low", false))
        .with_param(ManifestParameter::button("kill_mid", "Kill Mid", false))
        .with_param(ManifestParameter::button("kill_high", "Kill High", false))
}

pub struct EqualizerEffect {
    base: EffectBase,
    /// Splits off the low band; the rest goes to `upper`
    lower: SvfFilter,
    /// Band-pass centered between the crossovers for the mids
    upper: SvfFilter,
}

impl EqualizerEffect {
    pub fn new(manifest: ManifestPtr) -> Self {
        let center = (LOW_MID_HZ * MID_HIGH_HZ).sqrt();
        let q = center / (MID_HIGH_HZ - LOW_MID_HZ);
        Self {
            base: EffectBase::new(manifest),
            lower: SvfFilter::new(LOW_MID_HZ, 0.707),
            upper: SvfFilter::new(center, q),
        }
    }

    fn band_gain(&self, band: usize) -> f32 {
        if self.base.param_normalized(band + 3) >= 0.5 {
            0.0
        } else {
            self.base.param_actual(band)
        }
    }
}

impl EffectProcessor for EqualizerEffect {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        let (gl, gm, gh) = (self.band_gain(0), self.band_gain(1), self.band_gain(2));
        if gl == 1.0 && gm == 1.0 && gh == 1.0 {
            return;
        }
        let k = self.upper.k();

        for sample in buffer.iter_mut() {
            let split = self.lower.process(sample.left, sample.right);
            let rest = (sample.left - split.low.0, sample.right - split.low.1);
            let bands = self.upper.process(rest.0, rest.1);
            // rest = k*band + (low + high) of the upper filter
            sample.left = gl * split.low.0
                + gm * k * bands.band.0
                + gh * (bands.low.0 + bands.high.0);
            sample.right = gl * split.low.1
                + gm * k * bands.band.1
                + gh * (bands.low.1 + bands.high.1);
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
        self.lower.reset();
        self.upper.reset();
    }
}
