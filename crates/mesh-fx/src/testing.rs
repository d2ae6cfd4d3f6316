//! Test doubles shared by the unit tests
//!
//! - [`MockClapBackend`]: an external backend with a few manifests, one of
//!   which never instantiates
//! - [`MemoryPresetStore`]: preset storage kept in memory, inspectable after
//!   the coordinator took ownership of it
//! - [`run_quantum`]: one engine quantum plus a control-side drain
//! - [`init_logging`]: route `log` output to the test harness (`RUST_LOG`)

use anyhow::Result;
use std::sync::{Arc, Mutex};

use crate::backend::EffectsBackend;
use crate::coordinator::EffectsCoordinator;
use crate::effect::{EffectBase, EffectProcessor, ParamValue};
use crate::engine::EngineEffectsRegistry;
use crate::manifest::{BackendType, EffectManifest, LinkType, ManifestParameter, ManifestPtr};
use crate::preset::{ChainPreset, ChainPresetsSnapshot, EffectPreset, PresetStore};
use crate::types::StereoBuffer;

pub const ECHO_ID: &str = "com.example.echo";
pub const REVERB_ID: &str = "com.example.reverb";
pub const BROKEN_ID: &str = "com.example.broken";

pub fn echo_manifest() -> EffectManifest {
    EffectManifest::new(ECHO_ID, BackendType::Clap, "Echo")
        .with_param(ManifestParameter::new("time", "Time", 0.25).with_range(0.0, 2000.0).with_unit("ms"))
        .with_param(ManifestParameter::new("feedback", "Feedback", 0.4).with_link(LinkType::Linked, false))
        .with_param(ManifestParameter::button("sync", "Sync", true))
}

pub fn reverb_manifest() -> EffectManifest {
    EffectManifest::new(REVERB_ID, BackendType::Clap, "Reverb")
        .with_param(ManifestParameter::new("size", "Size", 0.5))
        .with_param(ManifestParameter::new("damping", "Damping", 0.3).with_link(LinkType::LinkedLeft, true))
}

/// Processor that only scales the signal by its first parameter
pub struct MockProcessor {
    base: EffectBase,
}

impl EffectProcessor for MockProcessor {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        let gain = self.base.param_normalized(0);
        buffer.scale(gain);
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

/// External backend with echo, reverb and a manifest that fails to load
pub struct MockClapBackend {
    manifests: Vec<ManifestPtr>,
}

impl MockClapBackend {
    pub fn new() -> Self {
        Self {
            manifests: vec![
                reverb_manifest().into_ptr(),
                echo_manifest().into_ptr(),
                EffectManifest::new(BROKEN_ID, BackendType::Clap, "Broken").into_ptr(),
            ],
        }
    }
}

impl EffectsBackend for MockClapBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Clap
    }

    fn manifests(&self) -> Vec<ManifestPtr> {
        self.manifests.clone()
    }

    fn can_instantiate(&self, id: &str) -> bool {
        id != BROKEN_ID && self.manifest(id).is_some()
    }

    fn create_processor(&self, manifest: &ManifestPtr) -> Option<Box<dyn EffectProcessor>> {
        if !self.can_instantiate(&manifest.id) {
            return None;
        }
        let manifest = self.manifest(&manifest.id)?;
        Some(Box::new(MockProcessor {
            base: EffectBase::new(manifest),
        }))
    }
}

/// Contents of a [`MemoryPresetStore`]
#[derive(Debug, Default)]
pub struct MemoryStoreState {
    pub snapshot: ChainPresetsSnapshot,
    pub library: Vec<ChainPreset>,
    pub defaults: Vec<EffectPreset>,
    pub snapshot_saves: usize,
}

/// In-memory store; clones share state
#[derive(Debug, Clone, Default)]
pub struct MemoryPresetStore {
    pub state: Arc<Mutex<MemoryStoreState>>,
}

impl MemoryPresetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(library: Vec<ChainPreset>) -> Self {
        let store = Self::new();
        store.state.lock().unwrap().library = library;
        store
    }
}

impl PresetStore for MemoryPresetStore {
    fn load_chain_presets(&self, deck_groups: &[String]) -> ChainPresetsSnapshot {
        let mut snapshot = self.state.lock().unwrap().snapshot.clone();
        snapshot.quick.retain(|deck, _| deck_groups.contains(deck));
        snapshot.equalizer.retain(|deck, _| deck_groups.contains(deck));
        snapshot
    }

    fn save_chain_presets(&self, snapshot: &ChainPresetsSnapshot) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.snapshot = snapshot.clone();
        state.snapshot_saves += 1;
        Ok(())
    }

    fn load_preset_library(&self) -> Vec<ChainPreset> {
        self.state.lock().unwrap().library.clone()
    }

    fn save_preset_library(&self, presets: &[ChainPreset]) -> Result<()> {
        self.state.lock().unwrap().library = presets.to_vec();
        Ok(())
    }

    fn load_default_presets(&self) -> Vec<EffectPreset> {
        self.state.lock().unwrap().defaults.clone()
    }

    fn save_default_preset(&self, preset: &EffectPreset) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.defaults.retain(|p| !(p.id == preset.id && p.backend == preset.backend));
        state.defaults.push(preset.clone());
        Ok(())
    }
}

/// Capture log output in tests; filtered by `RUST_LOG`, warnings by default
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

/// Apply pending requests on the engine, then drain responses on the control
/// side. Returns the number of requests the engine applied.
pub fn run_quantum(coordinator: &mut EffectsCoordinator, engine: &mut EngineEffectsRegistry) -> usize {
    let applied = engine.on_quantum_start();
    coordinator.process_responses();
    applied
}

/// Run quanta until the bridge is idle
pub fn settle(coordinator: &mut EffectsCoordinator, engine: &mut EngineEffectsRegistry) {
    for _ in 0..16 {
        if run_quantum(coordinator, engine) == 0 && coordinator.outstanding_requests() == 0 {
            return;
        }
    }
    panic!("effects bridge did not settle");
}
