//! Builtin effects compiled into mesh
//!
//! Zero-latency native processors. They are always available, so the
//! coordinator registers this backend on construction.

mod equalizer;
mod filter;
mod gain;
mod svf;

pub use equalizer::{EqualizerEffect, EQUALIZER_ID};
pub use filter::{DjFilterEffect, FILTER_ID};
pub use gain::{GainEffect, GAIN_ID};

use super::EffectsBackend;
use crate::effect::EffectProcessor;
use crate::manifest::{BackendType, ManifestPtr};

/// Backend for the native effects
pub struct BuiltInBackend {
    manifests: Vec<ManifestPtr>,
}

impl BuiltInBackend {
    pub fn new() -> Self {
        Self {
            manifests: vec![
                gain::manifest().into_ptr(),
                filter::manifest().into_ptr(),
                equalizer::manifest().into_ptr(),
            ],
        }
    }
}

impl Default for BuiltInBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectsBackend for BuiltInBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::BuiltIn
    }

    fn manifests(&self) -> Vec<ManifestPtr> {
        self.manifests.clone()
    }

    fn manifest(&self, id: &str) -> Option<ManifestPtr> {
        self.manifests.iter().find(|m| m.id == id).cloned()
    }

    fn create_processor(&self, manifest: &ManifestPtr) -> Option<Box<dyn EffectProcessor>> {
        if manifest.backend_type != BackendType::BuiltIn {
            return None;
        }
        // Processors hold our own manifest pointer so identity checks by
        // pointer stay valid
        let manifest = self.manifest(&manifest.id)?;
        let processor: Box<dyn EffectProcessor> = match manifest.id.as_str() {
            GAIN_ID => Box::new(GainEffect::new(manifest)),
            FILTER_ID => Box::new(DjFilterEffect::new(manifest)),
            EQUALIZER_ID => Box::new(EqualizerEffect::new(manifest)),
            _ => return None,
        };
        Some(processor)
    }
}
