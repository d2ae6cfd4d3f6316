//! Effect backends
//!
//! A backend is a capability: given a manifest it produces a processor or
//! reports that it cannot. The coordinator owns every backend and drops
//! them only after all chain slots (and the processors they own) are gone.

pub mod builtin;

pub use builtin::{BuiltInBackend, EQUALIZER_ID, FILTER_ID, GAIN_ID};

use crate::effect::EffectProcessor;
use crate::manifest::{BackendType, ManifestPtr};

/// A source of effect processors
pub trait EffectsBackend: Send {
    /// Which backend family this is
    fn backend_type(&self) -> BackendType;

    /// Every manifest this backend publishes
    fn manifests(&self) -> Vec<ManifestPtr>;

    /// Look up one manifest by effect id
    fn manifest(&self, id: &str) -> Option<ManifestPtr> {
        self.manifests().into_iter().find(|m| m.id == id)
    }

    /// Whether `create_processor` can succeed for this effect id
    fn can_instantiate(&self, id: &str) -> bool {
        self.manifest(id).is_some()
    }

    /// Build a processor for a manifest (control thread only)
    fn create_processor(&self, manifest: &ManifestPtr) -> Option<Box<dyn EffectProcessor>>;
}
