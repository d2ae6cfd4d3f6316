//! Effect slots - one position within a chain
//!
//! A slot is `Empty`, `Loaded`, or `Transitioning` while a load request is in
//! flight. Only one load per slot is ever in flight: a load issued while the
//! slot is transitioning is held back and sent when the response arrives.
//! The control-side state (manifest, parameters) always reflects the most
//! recent load so the UI never shows a stale effect.

use crate::bridge::{ControlBridge, EffectSwap, EffectsResponse, RequestId, RequestKind, ResponsePayload};
use crate::chain::kind::effect_slot_group;
use crate::chain::parameter::ParameterSlot;
use crate::chain::ChainId;
use crate::effect::EffectProcessor;
use crate::manifest::{ManifestPtr, ParameterKind};
use crate::preset::EffectPreset;

/// Lifecycle state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Loaded,
    /// A load request is in flight
    Transitioning,
}

/// Control-side state of a loaded effect
#[derive(Debug, Clone)]
struct LoadedEffect {
    manifest: ManifestPtr,
    /// Display order: shown parameters first, then hidden ones
    parameters: Vec<ParameterSlot>,
    meta: f32,
    enabled: bool,
}

impl LoadedEffect {
    fn new(manifest: ManifestPtr, preset: Option<&EffectPreset>, chain_super: f32, adopt_super: bool) -> Self {
        let count = manifest.parameters.len();
        let mut parameters = Vec::with_capacity(count);
        let mut seen = vec![false; count];

        for saved in preset.map(|p| p.parameters.as_slice()).unwrap_or_default() {
            let Some(index) = manifest.parameter_index(&saved.id) else {
                log::debug!("Preset parameter '{}' unknown to {}", saved.id, manifest.unique_id());
                continue;
            };
            if std::mem::replace(&mut seen[index], true) {
                continue;
            }
            let mut slot = ParameterSlot::from_manifest(index, &manifest.parameters[index]);
            slot.set_value(saved.value);
            slot.set_hidden(saved.hidden);
            slot.set_link(saved.link_type, saved.link_inverted);
            parameters.push(slot);
        }
        for (index, param) in manifest.parameters.iter().enumerate() {
            if !seen[index] {
                parameters.push(ParameterSlot::from_manifest(index, param));
            }
        }
        parameters.sort_by_key(|p| p.is_hidden());

        let mut loaded = Self {
            meta: manifest.default_meta,
            manifest,
            parameters,
            enabled: true,
        };
        match preset.and_then(|p| p.meta_parameter).filter(|_| adopt_super) {
            Some(meta) => loaded.meta = meta.clamp(0.0, 1.0),
            None => {
                loaded.meta = chain_super.clamp(0.0, 1.0);
                loaded.relink();
            }
        }
        loaded
    }

    /// Re-derive linked parameters from the meta value
    ///
    /// Returns `(manifest index, value)` of every parameter that follows it.
    fn relink(&mut self) -> Vec<(usize, f32)> {
        let meta = self.meta;
        self.parameters
            .iter_mut()
            .filter_map(|p| {
                let value = p.linked_value(meta)?;
                p.set_value(value);
                Some((p.manifest_index(), p.value()))
            })
            .collect()
    }

    /// Parameter values in manifest (processor) order
    fn values(&self) -> Vec<f32> {
        let mut values = vec![0.0; self.manifest.parameters.len()];
        for param in &self.parameters {
            if let Some(value) = values.get_mut(param.manifest_index()) {
                *value = param.value();
            }
        }
        values
    }

    /// Position in `parameters` of the nth parameter of a kind
    fn position(&self, kind: ParameterKind, hidden: bool, n: usize) -> Option<usize> {
        self.parameters
            .iter()
            .enumerate()
            .filter(|(_, p)| p.kind() == kind && p.is_hidden() == hidden)
            .nth(n)
            .map(|(position, _)| position)
    }
}

/// A load waiting for the in-flight one to complete
struct DeferredLoad {
    processor: Option<Box<dyn EffectProcessor>>,
}

/// One position within a chain slot
pub struct EffectSlot {
    group: String,
    index: usize,
    loaded: Option<LoadedEffect>,
    pending: Option<RequestId>,
    deferred: Option<DeferredLoad>,
}

impl EffectSlot {
    pub(crate) fn new(chain_group: &str, index: usize) -> Self {
        Self {
            group: effect_slot_group(chain_group, index),
            index,
            loaded: None,
            pending: None,
            deferred: None,
        }
    }

    /// Group name, e.g. `[EffectRack1_EffectUnit1_Effect1]`
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Position in the chain (0-based)
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> SlotState {
        if self.pending.is_some() {
            SlotState::Transitioning
        } else if self.loaded.is_some() {
            SlotState::Loaded
        } else {
            SlotState::Empty
        }
    }

    pub fn manifest(&self) -> Option<&ManifestPtr> {
        self.loaded.as_ref().map(|l| &l.manifest)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.loaded.as_ref().is_some_and(|l| l.enabled)
    }

    /// Meta (super) value driving linked parameters
    pub fn meta(&self) -> Option<f32> {
        self.loaded.as_ref().map(|l| l.meta)
    }

    /// Request in flight for this slot
    pub fn pending_request(&self) -> Option<RequestId> {
        self.pending
    }

    pub fn has_deferred_load(&self) -> bool {
        self.deferred.is_some()
    }

    /// Every parameter in display order (shown first, then hidden)
    pub fn parameters(&self) -> &[ParameterSlot] {
        self.loaded.as_ref().map(|l| l.parameters.as_slice()).unwrap_or_default()
    }

    /// Shown parameters of a kind, in display order
    pub fn loaded_parameters(&self, kind: ParameterKind) -> Vec<&ParameterSlot> {
        self.parameters()
            .iter()
            .filter(|p| p.kind() == kind && !p.is_hidden())
            .collect()
    }

    /// Hidden parameters of a kind, in display order
    pub fn hidden_parameters(&self, kind: ParameterKind) -> Vec<&ParameterSlot> {
        self.parameters()
            .iter()
            .filter(|p| p.kind() == kind && p.is_hidden())
            .collect()
    }

    /// The nth shown parameter of a kind (0-based)
    pub fn parameter_slot(&self, kind: ParameterKind, n: usize) -> Option<&ParameterSlot> {
        let loaded = self.loaded.as_ref()?;
        loaded
            .position(kind, false, n)
            .map(|position| &loaded.parameters[position])
    }

    /// Parameter by manifest parameter id
    pub fn parameter(&self, id: &str) -> Option<&ParameterSlot> {
        self.parameters().iter().find(|p| p.id() == id)
    }

    /// Load a manifest and its processor, or unload with `None`
    ///
    /// Returns false when the request could not be sent; the slot is then
    /// left as it was.
    pub(crate) fn load(
        &mut self,
        bridge: &mut ControlBridge,
        chain: ChainId,
        manifest: Option<ManifestPtr>,
        processor: Option<Box<dyn EffectProcessor>>,
        preset: Option<&EffectPreset>,
        chain_super: f32,
        adopt_super: bool,
    ) -> bool {
        let (loaded, processor) = match (manifest, processor) {
            (Some(manifest), Some(processor)) => (
                Some(LoadedEffect::new(manifest, preset, chain_super, adopt_super)),
                Some(processor),
            ),
            (Some(manifest), None) => {
                log::warn!(
                    "No processor for {}, leaving {} empty",
                    manifest.unique_id(),
                    self.group
                );
                (None, None)
            }
            (None, _) => (None, None),
        };

        if self.pending.is_some() {
            log::debug!("{} is transitioning, deferring load", self.group);
            self.loaded = loaded;
            self.deferred = Some(DeferredLoad { processor });
            return true;
        }

        let swap = Self::swap_for(loaded.as_ref(), processor);
        match bridge.send(chain, RequestKind::LoadEffect { slot: self.index, swap: Box::new(swap) }) {
            Ok(id) => {
                log::debug!(
                    "Loading {} into {}",
                    loaded.as_ref().map(|l| l.manifest.unique_id()).unwrap_or_else(|| "nothing".into()),
                    self.group
                );
                self.loaded = loaded;
                self.pending = Some(id);
                true
            }
            Err(err) => {
                log::error!("Failed to load effect into {}: {}", self.group, err);
                false
            }
        }
    }

    fn swap_for(loaded: Option<&LoadedEffect>, processor: Option<Box<dyn EffectProcessor>>) -> EffectSwap {
        match (loaded, processor) {
            (Some(loaded), Some(processor)) => {
                EffectSwap::load(loaded.manifest.clone(), processor, loaded.values(), loaded.enabled)
            }
            _ => EffectSwap::unload(),
        }
    }

    /// Handle the response to this slot's in-flight load
    ///
    /// Disposes the returned processor and sends any deferred load. Returns
    /// false if the response does not belong to the pending request.
    pub(crate) fn on_response(&mut self, bridge: &mut ControlBridge, chain: ChainId, response: EffectsResponse) -> bool {
        if self.pending != Some(response.id) {
            return false;
        }
        self.pending = None;
        if !response.success {
            log::warn!("Engine could not apply load #{} to {}", response.id.0, self.group);
        }
        if let ResponsePayload::Swapped(previous) = response.payload {
            if let Some(manifest) = &previous.manifest {
                log::debug!("Disposing {} from {}", manifest.unique_id(), self.group);
            }
        }

        if let Some(deferred) = self.deferred.take() {
            self.dispatch_deferred(bridge, chain, deferred);
        }
        true
    }

    fn dispatch_deferred(&mut self, bridge: &mut ControlBridge, chain: ChainId, deferred: DeferredLoad) {
        if !verify_or_debug_assert!(
            self.pending.is_none(),
            "{} already has request #{:?} in flight",
            self.group,
            self.pending
        ) {
            return;
        }
        let swap = Self::swap_for(self.loaded.as_ref(), deferred.processor);
        match bridge.send(chain, RequestKind::LoadEffect { slot: self.index, swap: Box::new(swap) }) {
            Ok(id) => self.pending = Some(id),
            Err(err) => log::error!("Failed to send deferred load for {}: {}", self.group, err),
        }
    }

    fn send_parameter(&self, bridge: &mut ControlBridge, chain: ChainId, parameter: usize, value: f32) {
        // A deferred load carries current values with it
        if self.deferred.is_some() {
            return;
        }
        let kind = RequestKind::SetEffectParameter {
            slot: self.index,
            parameter,
            value,
        };
        if let Err(err) = bridge.send(chain, kind) {
            log::warn!("Parameter update for {} not sent: {}", self.group, err);
        }
    }

    /// Set the nth shown parameter of a kind
    pub(crate) fn set_parameter(
        &mut self,
        bridge: &mut ControlBridge,
        chain: ChainId,
        kind: ParameterKind,
        n: usize,
        value: f32,
    ) -> bool {
        let Some(loaded) = self.loaded.as_mut() else {
            return false;
        };
        let Some(position) = loaded.position(kind, false, n) else {
            return false;
        };
        let param = &mut loaded.parameters[position];
        param.set_value(value);
        let (index, value) = (param.manifest_index(), param.value());
        self.send_parameter(bridge, chain, index, value);
        true
    }

    /// Move the meta knob; linked parameters follow when it actually moves
    pub(crate) fn set_meta(&mut self, bridge: &mut ControlBridge, chain: ChainId, meta: f32, force: bool) {
        let Some(loaded) = self.loaded.as_mut() else {
            return;
        };
        let meta = meta.clamp(0.0, 1.0);
        if !force && loaded.meta == meta {
            return;
        }
        loaded.meta = meta;
        for (index, value) in loaded.relink() {
            self.send_parameter(bridge, chain, index, value);
        }
    }

    pub(crate) fn set_enabled(&mut self, bridge: &mut ControlBridge, chain: ChainId, enabled: bool) -> bool {
        let Some(loaded) = self.loaded.as_mut() else {
            return false;
        };
        if loaded.enabled == enabled {
            return true;
        }
        loaded.enabled = enabled;
        if self.deferred.is_none() {
            let kind = RequestKind::SetEffectEnabled {
                slot: self.index,
                enabled,
            };
            if let Err(err) = bridge.send(chain, kind) {
                log::warn!("Enable update for {} not sent: {}", self.group, err);
            }
        }
        true
    }

    /// Hide the nth shown parameter of a kind
    pub(crate) fn hide_parameter(&mut self, kind: ParameterKind, n: usize) -> bool {
        let Some(loaded) = self.loaded.as_mut() else {
            return false;
        };
        let Some(position) = loaded.position(kind, false, n) else {
            return false;
        };
        let mut param = loaded.parameters.remove(position);
        param.set_hidden(true);
        loaded.parameters.push(param);
        true
    }

    /// Show the nth hidden parameter of a kind; it becomes the last shown one
    pub(crate) fn show_parameter(&mut self, kind: ParameterKind, n: usize) -> bool {
        let Some(loaded) = self.loaded.as_mut() else {
            return false;
        };
        let Some(position) = loaded.position(kind, true, n) else {
            return false;
        };
        let mut param = loaded.parameters.remove(position);
        param.set_hidden(false);
        let shown = loaded.parameters.iter().filter(|p| !p.is_hidden()).count();
        loaded.parameters.insert(shown, param);
        true
    }
}

impl std::fmt::Debug for EffectSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectSlot")
            .field("group", &self.group)
            .field("state", &self.state())
            .field("manifest", &self.manifest().map(|m| m.unique_id()))
            .field("deferred", &self.deferred.is_some())
            .finish()
    }
}
