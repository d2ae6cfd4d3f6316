//! Effect processors - the audio-thread side of a loaded effect
//!
//! Backends turn a manifest into a boxed [`EffectProcessor`]. The processor
//! is built on the control thread, moved into the engine through the bridge
//! and moved back out for disposal, so it never allocates or frees on the
//! audio thread. All parameters are normalized (0.0-1.0).

use crate::manifest::{ManifestParameter, ManifestPtr};
use crate::types::StereoBuffer;

/// Current parameter value with display mapping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamValue {
    /// Normalized value (0.0-1.0)
    pub normalized: f32,
    /// Actual value after range mapping
    pub actual: f32,
}

impl Default for ParamValue {
    fn default() -> Self {
        Self {
            normalized: 0.5,
            actual: 0.5,
        }
    }
}

impl ParamValue {
    /// Create from normalized value with the given parameter descriptor
    pub fn from_normalized(normalized: f32, info: &ManifestParameter) -> Self {
        let normalized = info.quantize(normalized);
        Self {
            normalized,
            actual: info.actual(normalized),
        }
    }
}

/// The processor trait - implemented by every loadable effect
///
/// Processors run in place on a stereo buffer. They must be real-time safe:
/// no allocation, no locks, no I/O in `process`, `set_param` or `reset`.
pub trait EffectProcessor: Send {
    /// Process a stereo buffer in-place
    fn process(&mut self, buffer: &mut StereoBuffer);

    /// Processing latency in samples
    fn latency_samples(&self) -> u32 {
        0
    }

    /// The manifest this processor was created from
    fn manifest(&self) -> &ManifestPtr;

    /// Current parameter values, in manifest order
    fn params(&self) -> &[ParamValue];

    /// Set a parameter by index (normalized value 0.0-1.0)
    fn set_param(&mut self, index: usize, value: f32);

    /// Reset internal state (filter memories, delay lines)
    fn reset(&mut self);
}

/// Base implementation helper for processors
///
/// Owns the manifest reference and the parameter storage.
#[derive(Debug, Clone)]
pub struct EffectBase {
    manifest: ManifestPtr,
    params: Vec<ParamValue>,
}

impl EffectBase {
    /// Create a new base with every parameter at its manifest default
    pub fn new(manifest: ManifestPtr) -> Self {
        let params = manifest
            .parameters
            .iter()
            .map(|p| ParamValue::from_normalized(p.default, p))
            .collect();
        Self { manifest, params }
    }

    pub fn manifest(&self) -> &ManifestPtr {
        &self.manifest
    }

    pub fn params(&self) -> &[ParamValue] {
        &self.params
    }

    /// Set a parameter value; out-of-range indices are ignored
    pub fn set_param(&mut self, index: usize, value: f32) {
        if let (Some(slot), Some(info)) = (self.params.get_mut(index), self.manifest.parameters.get(index)) {
            *slot = ParamValue::from_normalized(value, info);
        }
    }

    /// Get a parameter's actual (denormalized) value
    pub fn param_actual(&self, index: usize) -> f32 {
        self.params.get(index).map(|p| p.actual).unwrap_or(0.0)
    }

    /// Get a parameter's normalized value
    pub fn param_normalized(&self, index: usize) -> f32 {
        self.params.get(index).map(|p| p.normalized).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{BackendType, EffectManifest};

    #[test]
    fn test_param_value_mapping() {
        let info = ManifestParameter::new("test", "Test", 0.5).with_range(0.0, 100.0);

        let value = ParamValue::from_normalized(0.5, &info);
        assert_eq!(value.normalized, 0.5);
        assert_eq!(value.actual, 50.0);

        let value = ParamValue::from_normalized(1.5, &info);
        assert_eq!(value.normalized, 1.0);
        assert_eq!(value.actual, 100.0);
    }

    #[test]
    fn test_effect_base() {
        let manifest = EffectManifest::new("test", BackendType::BuiltIn, "Test")
            .with_param(ManifestParameter::new("p1", "P1", 0.5).with_range(0.0, 100.0))
            .with_param(ManifestParameter::new("p2", "P2", 0.0).with_range(-1.0, 1.0))
            .into_ptr();

        let mut base = EffectBase::new(manifest);
        assert_eq!(base.param_actual(0), 50.0);
        assert_eq!(base.param_actual(1), -1.0);

        base.set_param(0, 1.0);
        assert_eq!(base.param_actual(0), 100.0);
        base.set_param(1, 0.5);
        assert_eq!(base.param_actual(1), 0.0);

        // Out of range is ignored
        base.set_param(7, 1.0);
        assert_eq!(base.params().len(), 2);
        assert_eq!(base.param_normalized(7), 0.0);
    }
}
