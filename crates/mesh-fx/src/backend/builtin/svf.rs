//! Two-pole (12dB/octave) state-variable filter shared by the builtin effects

use crate::types::SAMPLE_RATE;

/// Stereo filter outputs of one sample
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SvfOutput {
    pub low: (f32, f32),
    pub band: (f32, f32),
    pub high: (f32, f32),
}

#[derive(Debug, Clone)]
pub(crate) struct SvfFilter {
    ic1eq_l: f32,
    ic2eq_l: f32,
    ic1eq_r: f32,
    ic2eq_r: f32,
    g: f32,
    k: f32,
    a1: f32,
    a2: f32,
    a3: f32,
}

impl SvfFilter {
    pub fn new(cutoff: f32, q: f32) -> Self {
        let mut filter = Self {
            ic1eq_l: 0.0,
            ic2eq_l: 0.0,
            ic1eq_r: 0.0,
            ic2eq_r: 0.0,
            g: 0.0,
            k: 0.0,
            a1: 0.0,
            a2: 0.0,
            a3: 0.0,
        };
        filter.set_params(cutoff, q);
        filter
    }

    pub fn set_params(&mut self, cutoff: f32, q: f32) {
        let cutoff = cutoff.clamp(20.0, 20000.0);
        let q = q.clamp(0.1, 10.0);

        self.g = (std::f32::consts::PI * cutoff / SAMPLE_RATE as f32).tan();
        self.k = 1.0 / q;
        self.a1 = 1.0 / (1.0 + self.g * (self.g + self.k));
        self.a2 = self.g * self.a1;
        self.a3 = self.g * self.a2;
    }

    /// Damping factor (1/Q), needed to recombine the band output
    pub fn k(&self) -> f32 {
        self.k
    }

    #[inline]
    fn tick(&self, input: f32, ic1eq: &mut f32, ic2eq: &mut f32) -> (f32, f32, f32) {
        let v3 = input - *ic2eq;
        let v1 = self.a1 * *ic1eq + self.a2 * v3;
        let v2 = *ic2eq + self.a2 * *ic1eq + self.a3 * v3;
        *ic1eq = 2.0 * v1 - *ic1eq;
        *ic2eq = 2.0 * v2 - *ic2eq;

        let low = v2;
        let band = v1;
        let high = input - self.k * band - low;
        (low, band, high)
    }

    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> SvfOutput {
        let (mut c1, mut c2) = (self.ic1eq_l, self.ic2eq_l);
        let (low_l, band_l, high_l) = self.tick(left, &mut c1, &mut c2);
        self.ic1eq_l = c1;
        self.ic2eq_l = c2;

        let (mut c1, mut c2) = (self.ic1eq_r, self.ic2eq_r);
        let (low_r, band_r, high_r) = self.tick(right, &mut c1, &mut c2);
        self.ic1eq_r = c1;
        self.ic2eq_r = c2;

        SvfOutput {
            low: (low_l, low_r),
            band: (band_l, band_r),
            high: (high_l, high_r),
        }
    }

    pub fn reset(&mut self) {
        self.ic1eq_l = 0.0;
        self.ic2eq_l = 0.0;
        self.ic1eq_r = 0.0;
        self.ic2eq_r = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bands_recombine_to_input() {
        let mut filter = SvfFilter::new(1000.0, 0.707);
        for i in 0..64 {
            let x = (i as f32 * 0.3).sin();
            let out = filter.process(x, x);
            let sum = out.low.0 + filter.k() * out.band.0 + out.high.0;
            assert!((sum - x).abs() < 1e-4);
        }
    }

    #[test]
    fn test_reset_clears_state() {
        let mut filter = SvfFilter::new(200.0, 1.0);
        filter.process(1.0, 1.0);
        filter.reset();
        let out = filter.process(0.0, 0.0);
        assert_eq!(out.low, (0.0, 0.0));
    }
}
