//! Effects coordinator - the control-side owner of everything effects
//!
//! The coordinator owns the backends, the manifest catalogue, every chain
//! slot, the default-preset cache, the chain-preset library and the control
//! end of the bridge. Only it can see backends, manifests and chains at once,
//! so every cross-cutting operation (loading an effect, applying a chain
//! preset, saving defaults) goes through here.
//!
//! # Threading
//!
//! ```text
//! control thread                        audio thread
//! ┌─────────────────────┐   requests   ┌───────────────────────┐
//! │ EffectsCoordinator  │ ───────────► │ EngineEffectsRegistry │
//! │  chains, manifests  │ ◄─────────── │  engine chains        │
//! └─────────────────────┘   responses  └───────────────────────┘
//! ```
//!
//! [`EffectsCoordinator::new`] returns the engine registry; hand it to the
//! audio thread and call [`EffectsCoordinator::process_responses`]
//! regularly (every UI tick is plenty) on the control thread.
//!
//! # Teardown
//!
//! [`EffectsCoordinator::shutdown`] (also run on drop) stops new work,
//! persists chain state and default presets, removes every chain from the
//! engine, waits for the engine to hand back what it owns, and only then
//! drops the backends.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use crossbeam::channel::Receiver;

use crate::backend::{BuiltInBackend, EffectsBackend};
use crate::bridge::{effects_bridge, ControlBridge, RequestKind, ResponsePayload};
use crate::chain::{ChainId, ChainKind, ChainSlot, ChannelPolicy, EffectSlot, MixMode, ParameterSlot};
use crate::channel::{ChannelHandleAndGroup, ChannelHandleFactory, MAIN_OUTPUT_GROUP};
use crate::config::EffectsConfig;
use crate::engine::{EngineEffectsRegistry, MAX_ENGINE_CHAINS};
use crate::error::{EffectsError, EffectsResult};
use crate::events::{EffectsEvent, EventBus};
use crate::group::{EffectSlotKey, ParameterKey};
use crate::manifest::{parse_unique_id, BackendType, ManifestKey, ManifestPtr, ManifestRegistry, ParameterKind};
use crate::preset::{ChainPreset, ChainPresetManager, ChainPresetsSnapshot, EffectPreset, PresetStore};

/// Control-side coordinator of all effect chains
pub struct EffectsCoordinator {
    config: EffectsConfig,
    bridge: ControlBridge,
    /// Dropped last (see [`EffectsCoordinator::shutdown`])
    backends: BTreeMap<BackendType, Box<dyn EffectsBackend>>,
    manifests: ManifestRegistry,

    /// Indexed by [`ChainId`]
    chains: Vec<ChainSlot>,
    chains_by_group: HashMap<String, ChainId>,
    standard_chains: Vec<ChainId>,
    output_chain: Option<ChainId>,
    quick_chains: BTreeMap<String, ChainId>,
    equalizer_chains: BTreeMap<String, ChainId>,

    channels: ChannelHandleFactory,
    input_channels: Vec<ChannelHandleAndGroup>,
    output_channels: Vec<ChannelHandleAndGroup>,

    default_presets: HashMap<ManifestKey, EffectPreset>,
    preset_manager: ChainPresetManager,
    store: Box<dyn PresetStore>,
    events: EventBus,
    shut_down: bool,
    /// Chains asked to leave the engine during shutdown and not yet returned
    removing_chains: BTreeMap<ChainId, String>,
}

impl EffectsCoordinator {
    /// Create the coordinator and the engine registry for the audio thread
    ///
    /// The builtin backend is registered and the chain-preset library is
    /// read immediately; chains are created by [`setup`](Self::setup).
    pub fn new(config: EffectsConfig, store: Box<dyn PresetStore>) -> (Self, EngineEffectsRegistry) {
        let (bridge, engine_bridge) = effects_bridge(config.bridge_capacity);
        let preset_manager = ChainPresetManager::new(store.load_preset_library());
        log::info!(
            "Effects coordinator created (bridge capacity {}, {} saved chain presets)",
            bridge.capacity(),
            preset_manager.len()
        );

        let mut coordinator = Self {
            config,
            bridge,
            backends: BTreeMap::new(),
            manifests: ManifestRegistry::new(),
            chains: Vec::new(),
            chains_by_group: HashMap::new(),
            standard_chains: Vec::new(),
            output_chain: None,
            quick_chains: BTreeMap::new(),
            equalizer_chains: BTreeMap::new(),
            channels: ChannelHandleFactory::new(),
            input_channels: Vec::new(),
            output_channels: Vec::new(),
            default_presets: HashMap::new(),
            preset_manager,
            store,
            events: EventBus::default(),
            shut_down: false,
            removing_chains: BTreeMap::new(),
        };
        coordinator.add_backend(Box::new(BuiltInBackend::new()));
        coordinator.register_output_channel(MAIN_OUTPUT_GROUP);

        (coordinator, EngineEffectsRegistry::new(engine_bridge))
    }

    /// Create the standard and output chains, load the default presets and
    /// restore the chain state saved by the last session
    ///
    /// Decks added with [`add_deck`](Self::add_deck) before this call get
    /// their quick and equalizer chains restored as well.
    pub fn setup(&mut self) {
        for unit in 1..=self.config.standard_chains {
            if let Some(id) = self.create_chain(ChainKind::Standard { unit }, self.config.standard_chain_slots) {
                self.standard_chains.push(id);
            }
        }
        self.output_chain = self.create_chain(ChainKind::Output, self.config.output_chain_slots);
        log::info!("Created {} effect chains", self.chains.len());

        self.load_default_effect_presets();
        self.restore_chain_presets();
    }

    // ─────────────────────────────────────────────────────────────
    // Backends and manifests
    // ─────────────────────────────────────────────────────────────

    /// Register a backend and add its manifests to the catalogue
    ///
    /// A second backend of an already registered type is rejected.
    pub fn add_backend(&mut self, backend: Box<dyn EffectsBackend>) {
        let backend_type = backend.backend_type();
        if !verify_or_debug_assert!(
            !self.backends.contains_key(&backend_type),
            "effects backend {} registered twice",
            backend_type
        ) {
            return;
        }

        let added = self.manifests.extend(backend.manifests());
        log::info!("Registered effects backend {} with {} effects", backend_type, added);
        self.backends.insert(backend_type, backend);

        for uid in &self.config.hidden_effects {
            if let Some(manifest) = self.manifests.find_unique(uid) {
                if manifest.backend_type == backend_type {
                    self.manifests.set_visibility(&manifest, false);
                }
            }
        }
        self.events.publish(EffectsEvent::EffectsAvailable(self.manifests.len()));
    }

    /// Total number of known effects
    pub fn num_effects_available(&self) -> usize {
        self.manifests.len()
    }

    /// Every known manifest in catalogue order
    pub fn available_manifests(&self) -> &[ManifestPtr] {
        self.manifests.available()
    }

    pub fn visible_manifests(&self) -> &[ManifestPtr] {
        self.manifests.visible()
    }

    pub fn available_manifests_filtered<F>(&self, predicate: F) -> Vec<ManifestPtr>
    where
        F: FnMut(&ManifestPtr) -> bool,
    {
        self.manifests.filtered(predicate)
    }

    pub fn manifest(&self, id: &str, backend_type: BackendType) -> Option<ManifestPtr> {
        self.manifests.find(id, backend_type)
    }

    /// Resolve `"<id> <backend tag>"`; untagged ids resolve as builtin
    ///
    /// An empty uid resolves to `None`, which loads as an unload.
    pub fn manifest_from_unique_id(&self, uid: &str) -> Option<ManifestPtr> {
        let (id, backend_type) = parse_unique_id(uid)?;
        self.manifest(&id, backend_type)
    }

    /// First backend (in catalogue order) able to instantiate an effect id
    pub fn manifest_and_backend(&self, id: &str) -> Option<(ManifestPtr, BackendType)> {
        self.backends
            .iter()
            .filter(|(_, backend)| backend.can_instantiate(id))
            .find_map(|(backend_type, backend)| Some((backend.manifest(id)?, *backend_type)))
    }

    /// Name to show for an effect preset; "None" for an empty one
    pub fn display_name_for_preset(&self, preset: &EffectPreset) -> String {
        if preset.is_empty() {
            return "None".to_string();
        }
        match self.manifest(&preset.id, preset.backend) {
            Some(manifest) => manifest.name.clone(),
            None => {
                log::warn!("No manifest for preset effect '{}' ({})", preset.id, preset.backend);
                preset.id.clone()
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Visibility
    // ─────────────────────────────────────────────────────────────

    /// Id of the visible effect after `id`, cycling; empty if none is visible
    pub fn next_effect_id(&self, id: &str) -> String {
        self.manifests.next_effect_id(id)
    }

    /// Id of the visible effect before `id`, cycling; empty if none is visible
    pub fn prev_effect_id(&self, id: &str) -> String {
        self.manifests.prev_effect_id(id)
    }

    /// Show or hide an effect; observers hear about actual changes only
    pub fn set_effect_visibility(&mut self, manifest: &ManifestPtr, visible: bool) -> bool {
        let changed = self.manifests.set_visibility(manifest, visible);
        if changed {
            log::debug!(
                "Effect {} is now {}",
                manifest.unique_id(),
                if visible { "visible" } else { "hidden" }
            );
            self.events.publish(EffectsEvent::VisibleEffectsChanged);
        }
        changed
    }

    pub fn is_effect_visible(&self, manifest: &ManifestPtr) -> bool {
        self.manifests.is_visible(manifest)
    }

    // ─────────────────────────────────────────────────────────────
    // Chains and channels
    // ─────────────────────────────────────────────────────────────

    fn create_chain(&mut self, kind: ChainKind, slot_count: usize) -> Option<ChainId> {
        let group = kind.group();
        if !verify_or_debug_assert!(
            !self.chains_by_group.contains_key(&group),
            "effect chain {} created twice",
            group
        ) || !verify_or_debug_assert!(
            self.chains.len() < MAX_ENGINE_CHAINS,
            "no room for effect chain {} ({} chains)",
            group,
            MAX_ENGINE_CHAINS
        ) || !verify_or_debug_assert!(!self.shut_down, "effect chain {} created after shutdown", group)
        {
            return None;
        }

        let id = ChainId::new(self.chains.len());
        let mut chain = ChainSlot::new(id, kind, slot_count);
        if let Err(err) = self.bridge.send(id, RequestKind::AddChain(chain.engine_chain())) {
            log::error!("Could not install effect chain {}: {}", group, err);
            return None;
        }

        match chain.config().channels {
            ChannelPolicy::AllChannels => {
                for channel in &self.input_channels {
                    chain.register_input_channel(channel);
                }
                for channel in &self.output_channels {
                    chain.register_output_channel(channel);
                }
            }
            ChannelPolicy::Deck => {
                let deck = chain.kind().deck().map(|d| self.channels.get_or_create(d));
                let main = self.channels.get_or_create(MAIN_OUTPUT_GROUP);
                if let (Some(Some(deck)), Some(main)) = (deck, main) {
                    chain.register_input_channel(&deck);
                    chain.enable_input_channel(&mut self.bridge, &deck.group);
                    chain.register_output_channel(&main);
                    chain.enable_output_channel(&mut self.bridge, &main.group);
                }
            }
            ChannelPolicy::MainOutput => {
                if let Some(main) = self.channels.get_or_create(MAIN_OUTPUT_GROUP) {
                    chain.register_input_channel(&main);
                    chain.enable_input_channel(&mut self.bridge, &main.group);
                    chain.register_output_channel(&main);
                    chain.enable_output_channel(&mut self.bridge, &main.group);
                }
            }
        }

        log::debug!("Created effect chain {} ({}) with {} slots", group, id, slot_count);
        self.chains_by_group.insert(group, id);
        self.chains.push(chain);
        Some(id)
    }

    /// Add a deck: registers it as an input channel and creates its
    /// equalizer and quick chains with the configured default effects
    pub fn add_deck(&mut self, deck_group: &str) -> EffectsResult<()> {
        self.register_input_channel(deck_group);

        let deck = deck_group.to_string();
        if let Some(id) = self.create_chain(ChainKind::Equalizer { deck: deck.clone() }, self.config.equalizer_chain_slots) {
            self.equalizer_chains.insert(deck.clone(), id);
            let uid = self.config.default_equalizer_effect.clone();
            self.load_default_effect(id, &uid)?;
        }
        if let Some(id) = self.create_chain(ChainKind::Quick { deck: deck.clone() }, self.config.quick_chain_slots) {
            self.quick_chains.insert(deck, id);
            let uid = self.config.default_quick_effect.clone();
            self.load_default_effect(id, &uid)?;
        }
        Ok(())
    }

    fn load_default_effect(&mut self, id: ChainId, uid: &str) -> EffectsResult<()> {
        if uid.is_empty() || self.chains[id.index()].slot_count() == 0 {
            return Ok(());
        }
        match self.manifest_from_unique_id(uid) {
            Some(manifest) => self.load_into(id, 0, Some(manifest), None, self.config.adopt_super_from_preset),
            None => {
                log::warn!("Default effect '{}' for {} is not available", uid, self.chains[id.index()].group());
                Ok(())
            }
        }
    }

    /// Make an input channel known; standard chains pick it up at once
    pub fn register_input_channel(&mut self, group: &str) -> Option<ChannelHandleAndGroup> {
        if !verify_or_debug_assert!(
            !self.input_channels.iter().any(|c| c.group == group),
            "input channel {} registered twice",
            group
        ) {
            return None;
        }
        let Some(channel) = self.channels.get_or_create(group) else {
            log::warn!("No channel handle left for {}", group);
            return None;
        };
        for &id in &self.standard_chains {
            self.chains[id.index()].register_input_channel(&channel);
        }
        self.input_channels.push(channel.clone());
        Some(channel)
    }

    /// Make an output channel known; standard chains pick it up at once
    pub fn register_output_channel(&mut self, group: &str) -> Option<ChannelHandleAndGroup> {
        if !verify_or_debug_assert!(
            !self.output_channels.iter().any(|c| c.group == group),
            "output channel {} registered twice",
            group
        ) {
            return None;
        }
        let Some(channel) = self.channels.get_or_create(group) else {
            log::warn!("No channel handle left for {}", group);
            return None;
        };
        for &id in &self.standard_chains {
            self.chains[id.index()].register_output_channel(&channel);
        }
        self.output_channels.push(channel.clone());
        Some(channel)
    }

    /// Route a registered input channel through a chain, or stop routing it
    pub fn set_input_channel_enabled(&mut self, chain: &str, channel: &str, enabled: bool) -> EffectsResult<bool> {
        let (chain, bridge) = self.chain_and_bridge(chain)?;
        Ok(if enabled {
            chain.enable_input_channel(bridge, channel)
        } else {
            chain.disable_input_channel(bridge, channel)
        })
    }

    pub fn set_output_channel_enabled(&mut self, chain: &str, channel: &str, enabled: bool) -> EffectsResult<bool> {
        let (chain, bridge) = self.chain_and_bridge(chain)?;
        Ok(if enabled {
            chain.enable_output_channel(bridge, channel)
        } else {
            chain.disable_output_channel(bridge, channel)
        })
    }

    fn chain_id(&self, group: &str) -> EffectsResult<ChainId> {
        self.chains_by_group
            .get(group)
            .copied()
            .ok_or_else(|| EffectsError::UnknownChain(group.to_string()))
    }

    fn chain_and_bridge(&mut self, group: &str) -> EffectsResult<(&mut ChainSlot, &mut ControlBridge)> {
        let id = self.chain_id(group)?;
        Ok((&mut self.chains[id.index()], &mut self.bridge))
    }

    /// Chain slot by group name
    pub fn chain(&self, group: &str) -> Option<&ChainSlot> {
        let id = self.chains_by_group.get(group)?;
        self.chains.get(id.index())
    }

    /// Every chain in creation order
    pub fn chains(&self) -> &[ChainSlot] {
        &self.chains
    }

    /// Standard chain by 0-based position
    pub fn standard_chain(&self, index: usize) -> Option<&ChainSlot> {
        let id = self.standard_chains.get(index)?;
        self.chains.get(id.index())
    }

    pub fn output_chain(&self) -> Option<&ChainSlot> {
        self.output_chain.and_then(|id| self.chains.get(id.index()))
    }

    pub fn quick_chain(&self, deck_group: &str) -> Option<&ChainSlot> {
        let id = self.quick_chains.get(deck_group)?;
        self.chains.get(id.index())
    }

    pub fn equalizer_chain(&self, deck_group: &str) -> Option<&ChainSlot> {
        let id = self.equalizer_chains.get(deck_group)?;
        self.chains.get(id.index())
    }

    /// Effect slot addressed by a composite group such as
    /// `[EffectRack1_EffectUnit1_Effect2]`
    pub fn effect_slot_by_group(&self, group: &str) -> EffectsResult<&EffectSlot> {
        let key = EffectSlotKey::parse(group)?;
        let chain_group = key.chain_group();
        let chain = self
            .chain(&chain_group)
            .ok_or_else(|| EffectsError::UnknownChain(chain_group.clone()))?;
        chain.effect_slot(key.slot).ok_or(EffectsError::SlotOutOfRange {
            chain: chain_group,
            index: key.slot,
            count: chain.slot_count(),
        })
    }

    /// Parameter slot addressed by group and key (`parameterN`,
    /// `button_parameterN`); `None` when the slot shows no such parameter
    pub fn parameter_slot(&self, group: &str, key: &str) -> EffectsResult<Option<&ParameterSlot>> {
        let key = ParameterKey::parse(key)?;
        let slot = self.effect_slot_by_group(group)?;
        Ok(slot.parameter_slot(key.kind, key.index))
    }

    /// Set a parameter addressed by group and key
    pub fn set_parameter_by_key(&mut self, group: &str, key: &str, value: f32) -> EffectsResult<bool> {
        let slot_key = EffectSlotKey::parse(group)?;
        let key = ParameterKey::parse(key)?;
        self.set_parameter(&slot_key.chain_group(), slot_key.slot, key.kind, key.index, value)
    }

    // ─────────────────────────────────────────────────────────────
    // Chain controls
    // ─────────────────────────────────────────────────────────────

    pub fn set_mix_mode(&mut self, chain: &str, mix_mode: MixMode) -> EffectsResult<bool> {
        let (chain, bridge) = self.chain_and_bridge(chain)?;
        Ok(chain.set_mix_mode(bridge, mix_mode))
    }

    pub fn set_mix(&mut self, chain: &str, mix: f32) -> EffectsResult<bool> {
        let (chain, bridge) = self.chain_and_bridge(chain)?;
        Ok(chain.set_mix(bridge, mix))
    }

    pub fn set_chain_enabled(&mut self, chain: &str, enabled: bool) -> EffectsResult<()> {
        let (chain, bridge) = self.chain_and_bridge(chain)?;
        chain.set_enabled(bridge, enabled);
        Ok(())
    }

    /// Move a chain's super knob; linked parameters of every slot follow
    pub fn set_super_parameter(&mut self, chain: &str, value: f32) -> EffectsResult<()> {
        let (chain, bridge) = self.chain_and_bridge(chain)?;
        chain.set_super_parameter(bridge, value);
        Ok(())
    }

    pub fn set_super_parameter_default(&mut self, chain: &str, value: f32) -> EffectsResult<()> {
        let (chain, _) = self.chain_and_bridge(chain)?;
        chain.set_super_parameter_default(value);
        Ok(())
    }

    /// Unload every slot of a chain
    pub fn clear_chain(&mut self, chain: &str) -> EffectsResult<()> {
        let (chain, bridge) = self.chain_and_bridge(chain)?;
        chain.clear(bridge);
        Ok(())
    }

    pub fn set_effect_enabled(&mut self, chain: &str, slot: usize, enabled: bool) -> EffectsResult<bool> {
        let (chain, bridge) = self.chain_and_bridge(chain)?;
        Ok(chain.set_effect_enabled(bridge, slot, enabled))
    }

    /// Move one slot's meta knob
    pub fn set_effect_meta(&mut self, chain: &str, slot: usize, meta: f32) -> EffectsResult<bool> {
        let (chain, bridge) = self.chain_and_bridge(chain)?;
        Ok(chain.set_effect_meta(bridge, slot, meta))
    }

    /// Set the nth shown parameter of a kind in a slot
    pub fn set_parameter(
        &mut self,
        chain: &str,
        slot: usize,
        kind: ParameterKind,
        n: usize,
        value: f32,
    ) -> EffectsResult<bool> {
        let (chain, bridge) = self.chain_and_bridge(chain)?;
        Ok(chain.set_parameter(bridge, slot, kind, n, value))
    }

    pub fn hide_parameter(&mut self, chain: &str, slot: usize, kind: ParameterKind, n: usize) -> EffectsResult<bool> {
        let (chain, _) = self.chain_and_bridge(chain)?;
        Ok(chain.hide_parameter(slot, kind, n))
    }

    pub fn show_parameter(&mut self, chain: &str, slot: usize, kind: ParameterKind, n: usize) -> EffectsResult<bool> {
        let (chain, _) = self.chain_and_bridge(chain)?;
        Ok(chain.show_parameter(slot, kind, n))
    }

    // ─────────────────────────────────────────────────────────────
    // Loading effects
    // ─────────────────────────────────────────────────────────────

    /// Load an effect into a slot, or unload it with `manifest == None`
    ///
    /// Without a preset the manifest's cached default preset is used. If
    /// the backend cannot instantiate the effect the slot is unloaded and
    /// the failure returned.
    pub fn load_effect(
        &mut self,
        chain: &str,
        slot: usize,
        manifest: Option<ManifestPtr>,
        preset: Option<&EffectPreset>,
        adopt_super: bool,
    ) -> EffectsResult<()> {
        let id = self.chain_id(chain)?;
        self.load_into(id, slot, manifest, preset, adopt_super)
    }

    /// Load into a standard chain (0-based chain and slot)
    pub fn load_standard_effect(&mut self, index: usize, slot: usize, manifest: Option<ManifestPtr>) -> EffectsResult<()> {
        let id = *self
            .standard_chains
            .get(index)
            .ok_or_else(|| EffectsError::UnknownChain(ChainKind::Standard { unit: index + 1 }.group()))?;
        self.load_into(id, slot, manifest, None, self.config.adopt_super_from_preset)
    }

    pub fn load_output_effect(&mut self, slot: usize, manifest: Option<ManifestPtr>) -> EffectsResult<()> {
        let id = self
            .output_chain
            .ok_or_else(|| EffectsError::UnknownChain(ChainKind::Output.group()))?;
        self.load_into(id, slot, manifest, None, self.config.adopt_super_from_preset)
    }

    pub fn load_equalizer_effect(&mut self, deck_group: &str, slot: usize, manifest: Option<ManifestPtr>) -> EffectsResult<()> {
        let id = *self.equalizer_chains.get(deck_group).ok_or_else(|| {
            EffectsError::UnknownChain(ChainKind::Equalizer { deck: deck_group.to_string() }.group())
        })?;
        self.load_into(id, slot, manifest, None, self.config.adopt_super_from_preset)
    }

    pub fn load_quick_effect(&mut self, deck_group: &str, slot: usize, manifest: Option<ManifestPtr>) -> EffectsResult<()> {
        let id = *self.quick_chains.get(deck_group).ok_or_else(|| {
            EffectsError::UnknownChain(ChainKind::Quick { deck: deck_group.to_string() }.group())
        })?;
        self.load_into(id, slot, manifest, None, self.config.adopt_super_from_preset)
    }

    fn load_into(
        &mut self,
        id: ChainId,
        slot: usize,
        manifest: Option<ManifestPtr>,
        preset: Option<&EffectPreset>,
        adopt_super: bool,
    ) -> EffectsResult<()> {
        let chain = &mut self.chains[id.index()];
        let count = chain.slot_count();
        if !verify_or_debug_assert!(slot < count, "slot {} out of range for {}", slot, chain.group()) {
            return Err(EffectsError::SlotOutOfRange {
                chain: chain.group().to_string(),
                index: slot,
                count,
            });
        }
        let group = chain.effect_slot(slot).map(|s| s.group().to_string()).unwrap_or_default();

        let Some(manifest) = manifest else {
            if !chain.load_effect(&mut self.bridge, slot, None, None, None, false) {
                return Err(EffectsError::RequestNotSent(group));
            }
            self.events.publish(EffectsEvent::EffectLoaded { group, unique_id: None });
            return Ok(());
        };

        let Some(backend) = self.backends.get(&manifest.backend_type) else {
            log::warn!("No {} backend for {}, unloading {}", manifest.backend_type, manifest.id, group);
            chain.load_effect(&mut self.bridge, slot, None, None, None, false);
            return Err(EffectsError::UnknownBackend(manifest.backend_type));
        };
        let Some(processor) = backend.create_processor(&manifest) else {
            log::warn!("Could not instantiate {}, unloading {}", manifest.unique_id(), group);
            chain.load_effect(&mut self.bridge, slot, None, None, None, false);
            return Err(EffectsError::InstantiationFailed {
                id: manifest.id.clone(),
                backend: manifest.backend_type,
            });
        };

        let fallback;
        let preset = match preset {
            Some(preset) => preset,
            None => match self.default_presets.get(&manifest.key()) {
                Some(preset) => preset,
                None => {
                    fallback = EffectPreset::from_manifest(&manifest);
                    &fallback
                }
            },
        };

        let unique_id = manifest.unique_id();
        if !chain.load_effect(&mut self.bridge, slot, Some(manifest), Some(processor), Some(preset), adopt_super) {
            return Err(EffectsError::RequestNotSent(group));
        }
        self.events.publish(EffectsEvent::EffectLoaded {
            group,
            unique_id: Some(unique_id),
        });
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────
    // Chain presets
    // ─────────────────────────────────────────────────────────────

    /// Apply a chain preset to a chain
    ///
    /// Every slot gets exactly one load: the preset's entry at that position,
    /// or an unload for empty and missing entries. An entry whose effect
    /// cannot be resolved or instantiated leaves its slot empty and the rest
    /// of the preset still applies.
    pub fn apply_chain_preset(&mut self, chain: &str, preset: &ChainPreset) -> EffectsResult<()> {
        let id = self.chain_id(chain)?;
        self.apply_chain_preset_to(id, preset);
        Ok(())
    }

    fn apply_chain_preset_to(&mut self, id: ChainId, preset: &ChainPreset) {
        let slot_count = self.chains[id.index()].slot_count();
        if preset.effects.len() > slot_count {
            log::debug!(
                "Chain preset '{}' has {} effects, {} has {} slots",
                preset.name,
                preset.effects.len(),
                self.chains[id.index()].group(),
                slot_count
            );
        }

        // Entries without a saved meta value take the chain's super value
        let chain = &mut self.chains[id.index()];
        chain.set_super_parameter_default(preset.super_default);
        chain.restore_super_parameter(preset.super_value);

        for slot in 0..slot_count {
            let entry = preset
                .effects
                .get(slot)
                .filter(|e| !e.is_empty())
                .and_then(|effect| Some((self.resolve_preset_manifest(effect)?, effect)));
            let result = match entry {
                Some((manifest, effect)) => self.load_into(id, slot, Some(manifest), Some(effect), true),
                None => self.load_into(id, slot, None, None, false),
            };
            if let Err(err) = result {
                log::warn!("Chain preset '{}', slot {}: {}", preset.name, slot + 1, err);
            }
        }

        let index = self.preset_manager.preset_index(&preset.name);
        let chain = &mut self.chains[id.index()];
        chain.set_mix_mode(&mut self.bridge, preset.mix_mode);
        chain.set_preset_name(preset.name.clone());
        chain.set_loaded_preset_index(index);

        log::info!("Loaded chain preset '{}' into {}", preset.name, chain.group());
        self.events.publish(EffectsEvent::ChainPresetLoaded {
            chain: chain.group().to_string(),
            name: preset.name.clone(),
            index,
        });
    }

    fn resolve_preset_manifest(&self, effect: &EffectPreset) -> Option<ManifestPtr> {
        let Some(backend) = self.backends.get(&effect.backend) else {
            log::warn!("Preset effect '{}' needs missing backend {}", effect.id, effect.backend);
            return None;
        };
        let manifest = backend.manifest(&effect.id);
        if manifest.is_none() {
            log::warn!("Preset effect '{}' not found in backend {}", effect.id, effect.backend);
        }
        manifest
    }

    /// Apply a preset from the library by name
    pub fn load_chain_preset_by_name(&mut self, chain: &str, name: &str) -> EffectsResult<()> {
        let preset = self
            .preset_manager
            .preset(name)
            .cloned()
            .ok_or_else(|| EffectsError::PresetNotFound(name.to_string()))?;
        self.apply_chain_preset(chain, &preset)
    }

    /// Apply the library preset at `index`
    pub fn load_chain_preset_from_list(&mut self, chain: &str, index: usize) -> EffectsResult<()> {
        let preset = self
            .preset_manager
            .preset_at(index)
            .cloned()
            .ok_or_else(|| EffectsError::PresetNotFound(format!("#{}", index)))?;
        self.apply_chain_preset(chain, &preset)
    }

    /// Step through the library from the chain's current preset, wrapping
    pub fn select_chain_preset(&mut self, chain: &str, delta: i32) -> EffectsResult<()> {
        let id = self.chain_id(chain)?;
        let current = {
            let chain = &self.chains[id.index()];
            chain
                .loaded_preset_index()
                .or_else(|| self.preset_manager.preset_index(chain.preset_name()))
        };
        let preset = self
            .preset_manager
            .step(current, delta)
            .and_then(|index| self.preset_manager.preset_at(index))
            .cloned()
            .ok_or_else(|| EffectsError::PresetNotFound(format!("{:+}", delta)))?;
        self.apply_chain_preset_to(id, &preset);
        Ok(())
    }

    /// Saved chain presets in library order
    pub fn chain_presets(&self) -> &[ChainPreset] {
        self.preset_manager.presets()
    }

    /// Save a standard chain (0-based) to the library under `name`
    ///
    /// A preset with the same name is replaced in place. The chain becomes
    /// bound to the saved preset. Returns its library index.
    pub fn save_preset_from_standard_chain(&mut self, index: usize, name: &str) -> EffectsResult<usize> {
        let id = *self
            .standard_chains
            .get(index)
            .ok_or_else(|| EffectsError::UnknownChain(ChainKind::Standard { unit: index + 1 }.group()))?;

        let chain = &mut self.chains[id.index()];
        let preset = ChainPreset {
            name: name.to_string(),
            ..ChainPreset::from_chain_slot(chain)
        };
        let preset_index = self.preset_manager.save_preset(preset);
        chain.set_preset_name(name);
        chain.set_loaded_preset_index(Some(preset_index));

        self.persist_library()?;
        Ok(preset_index)
    }

    /// Remove a preset from the library; chains re-resolve their index
    pub fn delete_chain_preset(&mut self, name: &str) -> EffectsResult<bool> {
        if !self.preset_manager.delete_preset(name) {
            return Ok(false);
        }
        for chain in &mut self.chains {
            let index = self.preset_manager.preset_index(chain.preset_name());
            chain.set_loaded_preset_index(index);
        }
        self.persist_library()?;
        Ok(true)
    }

    fn persist_library(&mut self) -> EffectsResult<()> {
        self.store.save_preset_library(self.preset_manager.presets())?;
        self.events
            .publish(EffectsEvent::PresetLibraryChanged(self.preset_manager.len()));
        Ok(())
    }

    fn snapshot(&self) -> ChainPresetsSnapshot {
        let preset = |id: &ChainId| ChainPreset::from_chain_slot(&self.chains[id.index()]);
        ChainPresetsSnapshot {
            standard: self.standard_chains.iter().map(preset).collect(),
            output: self.output_chain.as_ref().map(preset),
            quick: self.quick_chains.iter().map(|(deck, id)| (deck.clone(), preset(id))).collect(),
            equalizer: self
                .equalizer_chains
                .iter()
                .map(|(deck, id)| (deck.clone(), preset(id)))
                .collect(),
        }
    }

    fn restore_chain_presets(&mut self) {
        let decks: Vec<String> = self
            .quick_chains
            .keys()
            .chain(self.equalizer_chains.keys())
            .cloned()
            .collect();
        let snapshot = self.store.load_chain_presets(&decks);

        let standard: Vec<(ChainId, ChainPreset)> = self
            .standard_chains
            .iter()
            .copied()
            .zip(snapshot.standard)
            .collect();
        for (id, preset) in standard {
            self.apply_chain_preset_to(id, &preset);
        }
        if let (Some(id), Some(preset)) = (self.output_chain, snapshot.output) {
            self.apply_chain_preset_to(id, &preset);
        }
        for (deck, preset) in snapshot.quick {
            if let Some(&id) = self.quick_chains.get(&deck) {
                self.apply_chain_preset_to(id, &preset);
            }
        }
        for (deck, preset) in snapshot.equalizer {
            if let Some(&id) = self.equalizer_chains.get(&deck) {
                self.apply_chain_preset_to(id, &preset);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Default presets
    // ─────────────────────────────────────────────────────────────

    /// Fill the default-preset cache from storage, deriving a default from
    /// the manifest for every effect without a stored one
    pub fn load_default_effect_presets(&mut self) {
        let mut loaded = 0;
        for preset in self.store.load_default_presets() {
            match self.manifest(&preset.id, preset.backend) {
                Some(manifest) => {
                    self.default_presets.insert(manifest.key(), preset);
                    loaded += 1;
                }
                None => log::debug!("Ignoring default preset for unknown effect '{}'", preset.id),
            }
        }
        for manifest in self.manifests.available() {
            self.default_presets
                .entry(manifest.key())
                .or_insert_with(|| EffectPreset::from_manifest(manifest));
        }
        log::info!("Loaded {} stored default effect presets", loaded);
    }

    /// Default preset used when an effect is loaded without one
    pub fn default_preset(&self, manifest: &ManifestPtr) -> Option<&EffectPreset> {
        self.default_presets.get(&manifest.key())
    }

    /// Replace an effect's default preset and store it
    ///
    /// Empty presets are ignored.
    pub fn save_default_for_effect(&mut self, preset: EffectPreset) -> EffectsResult<()> {
        if preset.is_empty() {
            return Ok(());
        }
        let manifest = self
            .manifest(&preset.id, preset.backend)
            .ok_or_else(|| EffectsError::ManifestNotFound {
                id: preset.id.clone(),
                backend: preset.backend,
            })?;

        self.store.save_default_preset(&preset)?;
        self.default_presets.insert(manifest.key(), preset);
        self.events.publish(EffectsEvent::DefaultPresetSaved {
            unique_id: manifest.unique_id(),
        });
        Ok(())
    }

    /// Make the current state of a standard chain's slot the effect's default
    pub fn save_default_for_slot(&mut self, index: usize, slot: usize) -> EffectsResult<()> {
        let chain = self
            .standard_chain(index)
            .ok_or_else(|| EffectsError::UnknownChain(ChainKind::Standard { unit: index + 1 }.group()))?;
        let effect_slot = chain.effect_slot(slot).ok_or_else(|| EffectsError::SlotOutOfRange {
            chain: chain.group().to_string(),
            index: slot,
            count: chain.slot_count(),
        })?;
        let preset = EffectPreset::from_effect_slot(effect_slot);
        self.save_default_for_effect(preset)
    }

    // ─────────────────────────────────────────────────────────────
    // Bridge and lifecycle
    // ─────────────────────────────────────────────────────────────

    /// Receiver for coordinator events published from now on; each
    /// subscriber gets every event
    pub fn subscribe(&mut self) -> Receiver<EffectsEvent> {
        self.events.subscribe()
    }

    /// Drain engine responses: dispose returned processors and chains and
    /// send loads that were waiting for them
    ///
    /// Returns the number of responses handled.
    pub fn process_responses(&mut self) -> usize {
        let mut handled = 0;
        while let Some(response) = self.bridge.pop_response() {
            handled += 1;
            if let ResponsePayload::Chain(_) = &response.payload {
                log::debug!("Engine returned chain {}", response.chain);
                self.removing_chains.remove(&response.chain);
                continue;
            }
            match self.chains.get_mut(response.chain.index()) {
                Some(chain) => chain.on_response(&mut self.bridge, response),
                None => log::debug!("Dropping response #{} for removed chain {}", response.id.0, response.chain),
            }
        }
        handled
    }

    /// Requests sent but not yet answered by the engine
    pub fn outstanding_requests(&self) -> usize {
        self.bridge.outstanding()
    }

    /// Groups of chains removed at shutdown that the engine never handed back
    pub fn unreleased_chains(&self) -> impl Iterator<Item = &str> {
        self.removing_chains.values().map(String::as_str)
    }

    /// Requests lost to a full queue
    pub fn dropped_requests(&self) -> usize {
        self.bridge.dropped_requests()
    }

    pub fn config(&self) -> &EffectsConfig {
        &self.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    fn persist(&self) {
        if let Err(e) = self.store.save_chain_presets(&self.snapshot()) {
            log::warn!("Failed to save effect chains: {:#}", e);
        }
        if let Err(e) = self.store.save_preset_library(self.preset_manager.presets()) {
            log::warn!("Failed to save chain presets: {:#}", e);
        }
        for preset in self.default_presets.values() {
            if let Err(e) = self.store.save_default_preset(preset) {
                log::warn!("Failed to save default preset: {:#}", e);
            }
        }
    }

    /// Tear everything down in order; safe to call more than once
    ///
    /// 1. Stop accepting new work on the bridge
    /// 2. Persist chain state, the library and default presets
    /// 3. Remove every chain from the engine and drop the chain slots
    /// 4. Drain responses until nothing is outstanding, the engine is gone,
    ///    or the configured timeout passes
    /// 5. Drop the backends
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        log::info!("Shutting down effects coordinator");

        self.bridge.start_shutdown();
        self.persist();

        for chain in std::mem::take(&mut self.chains) {
            match self.bridge.send(chain.id(), RequestKind::RemoveChain) {
                Ok(_) => {
                    self.removing_chains.insert(chain.id(), chain.group().to_string());
                }
                Err(err) => log::warn!("Could not remove effect chain {}: {}", chain.group(), err),
            }
        }
        self.chains_by_group.clear();
        self.standard_chains.clear();
        self.output_chain = None;
        self.quick_chains.clear();
        self.equalizer_chains.clear();

        self.drain(self.config.shutdown_timeout());

        log::info!("Dropping {} effects backends", self.backends.len());
        self.backends.clear();
    }

    fn drain(&mut self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_responses();
            if self.bridge.outstanding() == 0 {
                log::debug!("Effects bridge drained");
                return;
            }
            if !self.bridge.is_engine_alive() {
                log::info!(
                    "Effects engine gone with {} requests unanswered",
                    self.bridge.outstanding()
                );
                self.warn_unreleased_chains();
                return;
            }
            if Instant::now() >= deadline {
                log::warn!(
                    "Timed out waiting for {} effects responses",
                    self.bridge.outstanding()
                );
                self.warn_unreleased_chains();
                return;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn warn_unreleased_chains(&self) {
        if self.removing_chains.is_empty() {
            return;
        }
        let groups: Vec<&str> = self.unreleased_chains().collect();
        log::warn!(
            "{} effect chains were not returned by the engine: {}",
            groups.len(),
            groups.join(", ")
        );
    }
}

impl Drop for EffectsCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{EQUALIZER_ID, FILTER_ID, GAIN_ID};
    use crate::chain::SlotState;
    use crate::manifest::alphabetize_manifests;
    use crate::preset::EffectParameterPreset;
    use crate::testing::{init_logging, run_quantum, settle, MemoryPresetStore, MockClapBackend, ECHO_ID, REVERB_ID};

    const UNIT1: &str = "[EffectRack1_EffectUnit1]";

    fn coordinator_with(config: EffectsConfig, store: MemoryPresetStore) -> (EffectsCoordinator, EngineEffectsRegistry) {
        init_logging();
        let (mut coordinator, mut engine) = EffectsCoordinator::new(config, Box::new(store));
        coordinator.add_backend(Box::new(MockClapBackend::new()));
        coordinator.setup();
        settle(&mut coordinator, &mut engine);
        (coordinator, engine)
    }

    fn coordinator() -> (EffectsCoordinator, EngineEffectsRegistry) {
        coordinator_with(EffectsConfig::default(), MemoryPresetStore::new())
    }

    fn engine_ids(engine: &EngineEffectsRegistry, chain: &ChainSlot) -> Vec<Option<String>> {
        let engine_chain = engine.chain(chain.id()).unwrap();
        (0..engine_chain.slot_count())
            .map(|i| engine_chain.slot(i).and_then(|s| s.manifest()).map(|m| m.id.clone()))
            .collect()
    }

    fn slot_ids(chain: &ChainSlot) -> Vec<Option<String>> {
        chain
            .effect_slots()
            .iter()
            .map(|s| s.manifest().map(|m| m.id.clone()))
            .collect()
    }

    #[test]
    fn test_catalogue_sorted_and_unique() {
        let (coordinator, _engine) = coordinator();
        let available = coordinator.available_manifests();
        assert_eq!(coordinator.num_effects_available(), 6);
        assert!(available
            .windows(2)
            .all(|w| alphabetize_manifests(&w[0], &w[1]).is_lt()));
        assert_eq!(available[0].backend_type, BackendType::BuiltIn);
        assert_eq!(available[3].name, "Broken");
    }

    #[test]
    fn test_backend_publishes_effect_count() {
        let (mut coordinator, _engine) = EffectsCoordinator::new(EffectsConfig::default(), Box::new(MemoryPresetStore::new()));
        assert_eq!(coordinator.num_effects_available(), 3);
        let events = coordinator.subscribe();
        coordinator.add_backend(Box::new(MockClapBackend::new()));
        assert_eq!(events.try_iter().collect::<Vec<_>>(), [EffectsEvent::EffectsAvailable(6)]);
    }

    #[test]
    fn test_every_subscriber_is_notified() {
        let (mut coordinator, mut engine) = coordinator();
        let ui = coordinator.subscribe();
        let mapping = coordinator.subscribe();
        let gain = coordinator.manifest(GAIN_ID, BackendType::BuiltIn).unwrap();
        coordinator.load_standard_effect(0, 0, Some(gain)).unwrap();
        settle(&mut coordinator, &mut engine);

        let loaded = EffectsEvent::EffectLoaded {
            group: "[EffectRack1_EffectUnit1_Effect1]".to_string(),
            unique_id: Some(format!("{} BuiltIn", GAIN_ID)),
        };
        assert_eq!(ui.try_iter().collect::<Vec<_>>(), [loaded.clone()]);
        assert_eq!(mapping.try_iter().collect::<Vec<_>>(), [loaded]);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic)]
    fn test_duplicate_backend_rejected() {
        let (mut coordinator, _engine) = coordinator();
        coordinator.add_backend(Box::new(MockClapBackend::new()));
        assert_eq!(coordinator.num_effects_available(), 6);
    }

    #[test]
    fn test_manifest_lookups() {
        let (coordinator, _engine) = coordinator();
        let echo = coordinator.manifest_from_unique_id("com.example.echo CLAP").unwrap();
        assert_eq!(echo.id, ECHO_ID);
        // Untagged ids are builtin
        assert_eq!(coordinator.manifest_from_unique_id(GAIN_ID).unwrap().id, GAIN_ID);
        assert!(coordinator.manifest_from_unique_id("").is_none());
        assert!(coordinator.manifest_from_unique_id(ECHO_ID).is_none());

        let (manifest, backend) = coordinator.manifest_and_backend(REVERB_ID).unwrap();
        assert_eq!((manifest.id.as_str(), backend), (REVERB_ID, BackendType::Clap));
        assert!(coordinator.manifest_and_backend("com.example.broken").is_none());

        let clap = coordinator.available_manifests_filtered(|m| m.backend_type == BackendType::Clap);
        assert_eq!(clap.len(), 3);

        assert_eq!(coordinator.display_name_for_preset(&EffectPreset::empty()), "None");
        assert_eq!(coordinator.display_name_for_preset(&EffectPreset::from_manifest(&echo)), "Echo");
    }

    #[test]
    fn test_load_and_one_response() {
        let (mut coordinator, mut engine) = coordinator();
        let echo = coordinator.manifest(ECHO_ID, BackendType::Clap).unwrap();

        coordinator.load_effect(UNIT1, 1, Some(echo), None, false).unwrap();
        let chain = coordinator.chain(UNIT1).unwrap();
        assert_eq!(chain.effect_slot(1).unwrap().state(), SlotState::Transitioning);
        assert_eq!(coordinator.outstanding_requests(), 1);

        assert_eq!(run_quantum(&mut coordinator, &mut engine), 1);
        assert_eq!(coordinator.outstanding_requests(), 0);
        let chain = coordinator.chain(UNIT1).unwrap();
        assert_eq!(chain.effect_slot(1).unwrap().state(), SlotState::Loaded);
        assert_eq!(engine_ids(&engine, chain), [None, Some(ECHO_ID.to_string()), None]);

        // Default preset seeds the values
        let processor = engine.chain(chain.id()).unwrap().slot(1).unwrap().processor().unwrap();
        assert!((processor.params()[0].normalized - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_failed_instantiation_unloads() {
        let (mut coordinator, mut engine) = coordinator();
        let reverb = coordinator.manifest(REVERB_ID, BackendType::Clap).unwrap();
        let broken = coordinator.manifest("com.example.broken", BackendType::Clap).unwrap();
        coordinator.load_effect(UNIT1, 0, Some(reverb), None, false).unwrap();
        settle(&mut coordinator, &mut engine);

        let err = coordinator.load_effect(UNIT1, 0, Some(broken), None, false).unwrap_err();
        assert!(matches!(err, EffectsError::InstantiationFailed { .. }));
        settle(&mut coordinator, &mut engine);
        let chain = coordinator.chain(UNIT1).unwrap();
        assert_eq!(chain.effect_slot(0).unwrap().state(), SlotState::Empty);
        assert_eq!(engine_ids(&engine, chain)[0], None);
    }

    #[test]
    fn test_unknown_chain() {
        let (mut coordinator, _engine) = coordinator();
        let err = coordinator.load_effect("[EffectRack1_EffectUnit9]", 0, None, None, false).unwrap_err();
        assert!(matches!(err, EffectsError::UnknownChain(_)));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic)]
    fn test_slot_out_of_range() {
        let (mut coordinator, _engine) = coordinator();
        let err = coordinator.load_standard_effect(0, 3, None).unwrap_err();
        assert!(matches!(err, EffectsError::SlotOutOfRange { index: 3, count: 3, .. }));
    }

    #[test]
    fn test_request_order_is_response_order() {
        let (mut coordinator, mut engine) = coordinator();
        let gain = coordinator.manifest(GAIN_ID, BackendType::BuiltIn).unwrap();
        let echo = coordinator.manifest(ECHO_ID, BackendType::Clap).unwrap();
        coordinator.load_standard_effect(0, 0, Some(gain)).unwrap();
        settle(&mut coordinator, &mut engine);

        coordinator.load_standard_effect(0, 0, None).unwrap();
        coordinator.load_standard_effect(0, 1, Some(echo)).unwrap();
        let first = coordinator.chain(UNIT1).unwrap().effect_slot(0).unwrap().pending_request().unwrap();
        let second = coordinator.chain(UNIT1).unwrap().effect_slot(1).unwrap().pending_request().unwrap();
        assert!(first.0 < second.0);

        // Drain by hand to look at the responses in arrival order
        engine.on_quantum_start();
        let mut order = Vec::new();
        while let Some(response) = coordinator.bridge.pop_response() {
            order.push(response.id);
            let chain = &mut coordinator.chains[response.chain.index()];
            chain.on_response(&mut coordinator.bridge, response);
        }
        assert_eq!(order, [first, second]);
        let chain = coordinator.chain(UNIT1).unwrap();
        assert_eq!(engine_ids(&engine, chain), [None, Some(ECHO_ID.to_string()), None]);
    }

    #[test]
    fn test_unloading_empty_slot_is_answered_in_order() {
        let (mut coordinator, mut engine) = coordinator();
        let echo = coordinator.manifest(ECHO_ID, BackendType::Clap).unwrap();
        coordinator.load_standard_effect(0, 0, None).unwrap();
        coordinator.load_standard_effect(0, 1, Some(echo)).unwrap();
        let first = coordinator.chain(UNIT1).unwrap().effect_slot(0).unwrap().pending_request().unwrap();
        let second = coordinator.chain(UNIT1).unwrap().effect_slot(1).unwrap().pending_request().unwrap();
        assert_eq!(coordinator.outstanding_requests(), 2);

        assert_eq!(engine.on_quantum_start(), 2);
        let mut order = Vec::new();
        while let Some(response) = coordinator.bridge.pop_response() {
            order.push(response.id);
            let chain = &mut coordinator.chains[response.chain.index()];
            chain.on_response(&mut coordinator.bridge, response);
        }
        assert_eq!(order, [first, second]);
        let chain = coordinator.chain(UNIT1).unwrap();
        assert_eq!(engine_ids(&engine, chain), [None, Some(ECHO_ID.to_string()), None]);
        assert_eq!(chain.effect_slot(0).unwrap().state(), SlotState::Empty);
    }

    fn echo_chain_preset(name: &str) -> ChainPreset {
        ChainPreset::new(name)
            .with_effect(EffectPreset::empty())
            .with_effect(EffectPreset {
                id: ECHO_ID.into(),
                backend: BackendType::Clap,
                meta_parameter: Some(0.9),
                parameters: vec![
                    EffectParameterPreset::new("time", 0.6),
                    EffectParameterPreset::new("feedback", 0.15),
                ],
            })
            .with_effect(EffectPreset::empty())
            .with_mix_mode(MixMode::DryWet)
            .with_super(0.5)
    }

    #[test]
    fn test_equalizer_chain_preset_scenario() {
        let library = vec![ChainPreset::new("Other"), echo_chain_preset("Echo Tail")];
        let config = EffectsConfig {
            equalizer_chain_slots: 3,
            ..Default::default()
        };
        let (mut coordinator, mut engine) = coordinator_with(config, MemoryPresetStore::with_library(library));
        coordinator.add_deck("[Channel1]").unwrap();
        settle(&mut coordinator, &mut engine);

        let eq = "[EqualizerRack1_[Channel1]]";
        assert_eq!(
            slot_ids(coordinator.chain(eq).unwrap())[0].as_deref(),
            Some(EQUALIZER_ID)
        );

        coordinator.load_chain_preset_by_name(eq, "Echo Tail").unwrap();
        settle(&mut coordinator, &mut engine);

        let chain = coordinator.chain(eq).unwrap();
        let expected = vec![None, Some(ECHO_ID.to_string()), None];
        assert_eq!(slot_ids(chain), expected);
        assert_eq!(engine_ids(&engine, chain), expected);
        assert_eq!(chain.mix_mode(), MixMode::DryWet);
        assert_eq!(chain.super_parameter(), 0.5);
        assert_eq!(chain.loaded_preset_index(), Some(1));
        assert_eq!(chain.preset_name(), "Echo Tail");

        let slot = chain.effect_slot(1).unwrap();
        assert_eq!(slot.parameter("time").unwrap().value(), 0.6);
        assert_eq!(slot.parameter("feedback").unwrap().value(), 0.15);
        let processor = engine.chain(chain.id()).unwrap().slot(1).unwrap().processor().unwrap();
        assert!((processor.params()[0].normalized - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_chain_preset_roundtrip_and_idempotence() {
        let (mut coordinator, mut engine) = coordinator();
        let filter = coordinator.manifest(FILTER_ID, BackendType::BuiltIn).unwrap();
        let echo = coordinator.manifest(ECHO_ID, BackendType::Clap).unwrap();
        coordinator.load_standard_effect(0, 0, Some(filter)).unwrap();
        coordinator.load_standard_effect(0, 2, Some(echo)).unwrap();
        settle(&mut coordinator, &mut engine);
        coordinator.set_mix_mode(UNIT1, MixMode::DryPlusWet).unwrap();
        coordinator.set_super_parameter(UNIT1, 0.8).unwrap();
        coordinator.set_parameter(UNIT1, 2, ParameterKind::Knob, 0, 0.7).unwrap();
        settle(&mut coordinator, &mut engine);

        let index = coordinator.save_preset_from_standard_chain(0, "Mine").unwrap();
        assert_eq!(index, 0);
        let saved = coordinator.chain_presets()[0].clone();
        let before = ChainPreset::from_chain_slot(coordinator.chain(UNIT1).unwrap());

        coordinator.clear_chain(UNIT1).unwrap();
        settle(&mut coordinator, &mut engine);
        assert!(slot_ids(coordinator.chain(UNIT1).unwrap()).iter().all(Option::is_none));

        coordinator.apply_chain_preset(UNIT1, &saved).unwrap();
        settle(&mut coordinator, &mut engine);
        let once = ChainPreset::from_chain_slot(coordinator.chain(UNIT1).unwrap());
        assert_eq!(once, before);

        coordinator.apply_chain_preset(UNIT1, &saved).unwrap();
        settle(&mut coordinator, &mut engine);
        let twice = ChainPreset::from_chain_slot(coordinator.chain(UNIT1).unwrap());
        assert_eq!(twice, once);

        let chain = coordinator.chain(UNIT1).unwrap();
        assert_eq!(chain.mix_mode(), MixMode::DryPlusWet);
        assert_eq!(chain.super_parameter(), 0.8);
        assert_eq!(chain.effect_slot(0).unwrap().parameter("filter").unwrap().value(), 0.8);
        assert_eq!(engine.chain(chain.id()).unwrap().mix_mode(), MixMode::DryPlusWet);
        assert_eq!(
            engine_ids(&engine, chain),
            [Some(FILTER_ID.to_string()), None, Some(ECHO_ID.to_string())]
        );
    }

    #[test]
    fn test_preset_without_meta_values_is_idempotent() {
        let (mut coordinator, mut engine) = coordinator();
        let preset = ChainPreset::new("Legacy")
            .with_effect(EffectPreset {
                id: FILTER_ID.into(),
                ..Default::default()
            })
            .with_super(0.2);

        coordinator.apply_chain_preset(UNIT1, &preset).unwrap();
        settle(&mut coordinator, &mut engine);
        let chain = coordinator.chain(UNIT1).unwrap();
        let slot = chain.effect_slot(0).unwrap();
        assert_eq!(slot.meta(), Some(0.2));
        assert_eq!(slot.parameter("filter").unwrap().value(), 0.2);
        assert_eq!(chain.super_parameter(), 0.2);
        let once = ChainPreset::from_chain_slot(chain);

        coordinator.apply_chain_preset(UNIT1, &preset).unwrap();
        settle(&mut coordinator, &mut engine);
        let twice = ChainPreset::from_chain_slot(coordinator.chain(UNIT1).unwrap());
        assert_eq!(twice, once);
    }

    #[test]
    fn test_preset_with_missing_effect_skips_only_that_slot() {
        let (mut coordinator, mut engine) = coordinator();
        let preset = ChainPreset::new("Partial")
            .with_effect(EffectPreset {
                id: "com.example.gone".into(),
                backend: BackendType::Clap,
                ..Default::default()
            })
            .with_effect(EffectPreset {
                id: GAIN_ID.into(),
                ..Default::default()
            })
            .with_effect(EffectPreset {
                id: "patch".into(),
                backend: BackendType::Pd,
                ..Default::default()
            });
        coordinator.apply_chain_preset(UNIT1, &preset).unwrap();
        settle(&mut coordinator, &mut engine);

        let chain = coordinator.chain(UNIT1).unwrap();
        assert_eq!(slot_ids(chain), [None, Some(GAIN_ID.to_string()), None]);
        assert_eq!(chain.preset_name(), "Partial");
        assert_eq!(chain.loaded_preset_index(), None);
    }

    #[test]
    fn test_select_chain_preset_wraps() {
        let library = vec![
            echo_chain_preset("A"),
            ChainPreset::new("B").with_effect(EffectPreset {
                id: GAIN_ID.into(),
                ..Default::default()
            }),
        ];
        let (mut coordinator, mut engine) =
            coordinator_with(EffectsConfig::default(), MemoryPresetStore::with_library(library));

        coordinator.select_chain_preset(UNIT1, 1).unwrap();
        assert_eq!(coordinator.chain(UNIT1).unwrap().loaded_preset_index(), Some(0));
        coordinator.select_chain_preset(UNIT1, 1).unwrap();
        assert_eq!(coordinator.chain(UNIT1).unwrap().loaded_preset_index(), Some(1));
        coordinator.select_chain_preset(UNIT1, 1).unwrap();
        assert_eq!(coordinator.chain(UNIT1).unwrap().preset_name(), "A");
        coordinator.select_chain_preset(UNIT1, -1).unwrap();
        assert_eq!(coordinator.chain(UNIT1).unwrap().preset_name(), "B");
        settle(&mut coordinator, &mut engine);
        assert_eq!(slot_ids(coordinator.chain(UNIT1).unwrap())[0].as_deref(), Some(GAIN_ID));

        coordinator.load_chain_preset_from_list(UNIT1, 0).unwrap();
        assert_eq!(coordinator.chain(UNIT1).unwrap().preset_name(), "A");
        assert!(matches!(
            coordinator.load_chain_preset_from_list(UNIT1, 5),
            Err(EffectsError::PresetNotFound(_))
        ));

        // A manual load unbinds the chain from the library
        coordinator.load_standard_effect(0, 0, None).unwrap();
        assert_eq!(coordinator.chain(UNIT1).unwrap().loaded_preset_index(), None);

        assert!(coordinator.delete_chain_preset("A").unwrap());
        assert!(!coordinator.delete_chain_preset("A").unwrap());
        assert_eq!(coordinator.chain_presets().len(), 1);
    }

    #[test]
    fn test_cyclic_traversal_and_visibility() {
        let (mut coordinator, _engine) = coordinator();
        let visible: Vec<String> = coordinator.visible_manifests().iter().map(|m| m.id.clone()).collect();
        let start = visible[2].clone();

        let mut id = start.clone();
        for _ in 0..visible.len() {
            id = coordinator.next_effect_id(&id);
        }
        assert_eq!(id, start);
        for id in &visible {
            assert_eq!(&coordinator.prev_effect_id(&coordinator.next_effect_id(id)), id);
        }
        assert_eq!(coordinator.next_effect_id(""), visible[0]);
        assert_eq!(coordinator.prev_effect_id(""), visible[visible.len() - 1]);

        let events = coordinator.subscribe();

        let echo = coordinator.manifest(ECHO_ID, BackendType::Clap).unwrap();
        assert!(coordinator.set_effect_visibility(&echo, false));
        assert!(!coordinator.set_effect_visibility(&echo, false));
        assert!(!coordinator.is_effect_visible(&echo));
        assert_eq!(events.try_iter().count(), 1);
        assert!(coordinator.set_effect_visibility(&echo, true));
        assert_eq!(coordinator.visible_manifests().len(), visible.len());

        for manifest in coordinator.available_manifests().to_vec() {
            coordinator.set_effect_visibility(&manifest, false);
        }
        assert_eq!(coordinator.next_effect_id(ECHO_ID), "");
        assert_eq!(coordinator.prev_effect_id(""), "");
    }

    #[test]
    fn test_hidden_effects_from_config() {
        let config = EffectsConfig {
            hidden_effects: vec!["com.example.reverb CLAP".into()],
            ..Default::default()
        };
        let (coordinator, _engine) = coordinator_with(config, MemoryPresetStore::new());
        let reverb = coordinator.manifest(REVERB_ID, BackendType::Clap).unwrap();
        assert!(!coordinator.is_effect_visible(&reverb));
        assert_eq!(coordinator.visible_manifests().len(), 5);
    }

    #[test]
    fn test_default_presets() {
        let store = MemoryPresetStore::new();
        store.state.lock().unwrap().defaults.push(EffectPreset {
            id: REVERB_ID.into(),
            backend: BackendType::Clap,
            meta_parameter: None,
            parameters: vec![EffectParameterPreset::new("size", 0.9)],
        });
        let (mut coordinator, mut engine) = coordinator_with(EffectsConfig::default(), store.clone());

        let reverb = coordinator.manifest(REVERB_ID, BackendType::Clap).unwrap();
        assert_eq!(coordinator.default_preset(&reverb).unwrap().parameters[0].value, 0.9);
        let gain = coordinator.manifest(GAIN_ID, BackendType::BuiltIn).unwrap();
        assert_eq!(coordinator.default_preset(&gain).unwrap(), &EffectPreset::from_manifest(&gain));

        coordinator.load_standard_effect(0, 0, Some(reverb.clone())).unwrap();
        settle(&mut coordinator, &mut engine);
        let slot = coordinator.standard_chain(0).unwrap().effect_slot(0).unwrap();
        assert_eq!(slot.parameter("size").unwrap().value(), 0.9);

        coordinator.set_parameter(UNIT1, 0, ParameterKind::Knob, 0, 0.2).unwrap();
        coordinator.save_default_for_slot(0, 0).unwrap();
        assert_eq!(coordinator.default_preset(&reverb).unwrap().parameters[0].value, 0.2);
        let stored = store.state.lock().unwrap().defaults.clone();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].parameters[0].value, 0.2);

        // Saving an empty slot does nothing
        coordinator.save_default_for_slot(0, 1).unwrap();
        assert_eq!(store.state.lock().unwrap().defaults.len(), 1);
    }

    #[test]
    fn test_group_lookups() {
        let (mut coordinator, mut engine) = coordinator();
        coordinator.add_deck("[Channel2]").unwrap();
        settle(&mut coordinator, &mut engine);

        let slot = coordinator.effect_slot_by_group("[QuickEffectRack1_[Channel2]_Effect1]").unwrap();
        assert_eq!(slot.manifest().unwrap().id, FILTER_ID);
        let param = coordinator
            .parameter_slot("[QuickEffectRack1_[Channel2]_Effect1]", "parameter1")
            .unwrap()
            .unwrap();
        assert_eq!(param.id(), "filter");

        assert!(coordinator
            .set_parameter_by_key("[QuickEffectRack1_[Channel2]_Effect1]", "parameter2", 0.9)
            .unwrap());
        settle(&mut coordinator, &mut engine);
        let slot = coordinator.effect_slot_by_group("[QuickEffectRack1_[Channel2]_Effect1]").unwrap();
        assert_eq!(slot.parameter("resonance").unwrap().value(), 0.9);

        assert!(matches!(
            coordinator.effect_slot_by_group("[EffectRack1_EffectUnit1_Effect4]"),
            Err(EffectsError::SlotOutOfRange { .. })
        ));
        assert!(matches!(
            coordinator.effect_slot_by_group("[QuickEffectRack1_[Channel3]_Effect1]"),
            Err(EffectsError::UnknownChain(_))
        ));
        assert!(matches!(
            coordinator.effect_slot_by_group("garbage"),
            Err(EffectsError::GroupKey(_))
        ));
    }

    #[test]
    fn test_deck_channels_and_routing() {
        let (mut coordinator, mut engine) = coordinator();
        coordinator.add_deck("[Channel1]").unwrap();
        settle(&mut coordinator, &mut engine);

        let unit = coordinator.chain(UNIT1).unwrap();
        assert!(unit.is_input_registered("[Channel1]"));
        assert!(!unit.is_input_enabled("[Channel1]"));
        let quick = coordinator.quick_chain("[Channel1]").unwrap();
        assert!(quick.is_input_enabled("[Channel1]"));
        assert!(quick.is_output_enabled(MAIN_OUTPUT_GROUP));
        assert!(!quick.is_input_registered("[Channel2]"));

        assert!(coordinator.set_input_channel_enabled(UNIT1, "[Channel1]", true).unwrap());
        assert!(coordinator.set_output_channel_enabled(UNIT1, MAIN_OUTPUT_GROUP, true).unwrap());
        settle(&mut coordinator, &mut engine);

        let unit = coordinator.chain(UNIT1).unwrap();
        let deck = coordinator.channels.handle("[Channel1]").unwrap();
        let main = coordinator.channels.handle(MAIN_OUTPUT_GROUP).unwrap();
        assert!(engine.chain(unit.id()).unwrap().routes(deck, main));
        let unit2 = coordinator.standard_chain(1).unwrap();
        assert!(!engine.chain(unit2.id()).unwrap().routes(deck, main));
    }

    #[test]
    fn test_restricted_mix_on_quick_chain() {
        let (mut coordinator, mut engine) = coordinator();
        coordinator.add_deck("[Channel1]").unwrap();
        settle(&mut coordinator, &mut engine);
        let quick = "[QuickEffectRack1_[Channel1]]";
        assert!(!coordinator.set_mix_mode(quick, MixMode::DryPlusWet).unwrap());
        assert!(!coordinator.set_mix(quick, 0.2).unwrap());
        assert!(coordinator.set_mix(UNIT1, 0.2).unwrap());
    }

    #[test]
    fn test_setup_restores_snapshot() {
        let store = MemoryPresetStore::new();
        {
            let (mut coordinator, mut engine) = coordinator_with(EffectsConfig::default(), store.clone());
            coordinator.add_deck("[Channel1]").unwrap();
            let reverb = coordinator.manifest(REVERB_ID, BackendType::Clap).unwrap();
            coordinator.load_standard_effect(1, 2, Some(reverb)).unwrap();
            coordinator.load_quick_effect("[Channel1]", 0, None).unwrap();
            coordinator.set_super_parameter("[EffectRack1_EffectUnit2]", 0.3).unwrap();
            settle(&mut coordinator, &mut engine);
            drop(engine);
            coordinator.shutdown();
        }
        assert_eq!(store.state.lock().unwrap().snapshot_saves, 1);

        let (mut coordinator, mut engine) = EffectsCoordinator::new(EffectsConfig::default(), Box::new(store));
        coordinator.add_backend(Box::new(MockClapBackend::new()));
        coordinator.add_deck("[Channel1]").unwrap();
        coordinator.setup();
        settle(&mut coordinator, &mut engine);

        let unit2 = coordinator.standard_chain(1).unwrap();
        assert_eq!(slot_ids(unit2)[2].as_deref(), Some(REVERB_ID));
        assert_eq!(unit2.super_parameter(), 0.3);
        assert_eq!(slot_ids(coordinator.quick_chain("[Channel1]").unwrap()), [None]);
        assert_eq!(
            slot_ids(coordinator.equalizer_chain("[Channel1]").unwrap())[0].as_deref(),
            Some(EQUALIZER_ID)
        );
    }

    #[test]
    fn test_deferred_load_through_coordinator() {
        let (mut coordinator, mut engine) = coordinator();
        let gain = coordinator.manifest(GAIN_ID, BackendType::BuiltIn).unwrap();
        let echo = coordinator.manifest(ECHO_ID, BackendType::Clap).unwrap();
        coordinator.load_standard_effect(0, 0, Some(gain)).unwrap();
        coordinator.load_standard_effect(0, 0, Some(echo)).unwrap();
        assert_eq!(coordinator.outstanding_requests(), 1);
        assert!(coordinator.chain(UNIT1).unwrap().has_pending_requests());

        settle(&mut coordinator, &mut engine);
        let chain = coordinator.chain(UNIT1).unwrap();
        assert!(!chain.has_pending_requests());
        assert_eq!(engine_ids(&engine, chain)[0].as_deref(), Some(ECHO_ID));
    }

    #[test]
    fn test_shutdown_with_running_engine() {
        let store = MemoryPresetStore::new();
        let (mut coordinator, mut engine) = EffectsCoordinator::new(EffectsConfig::default(), Box::new(store.clone()));
        coordinator.add_backend(Box::new(MockClapBackend::new()));
        coordinator.setup();
        coordinator.add_deck("[Channel1]").unwrap();
        let echo = coordinator.manifest(ECHO_ID, BackendType::Clap).unwrap();
        coordinator.load_standard_effect(0, 0, Some(echo)).unwrap();
        settle(&mut coordinator, &mut engine);

        let audio = std::thread::spawn(move || {
            while engine.is_control_alive() {
                engine.on_quantum_start();
                std::thread::sleep(Duration::from_millis(1));
            }
            engine
        });

        coordinator.shutdown();
        assert!(coordinator.is_shut_down());
        assert_eq!(coordinator.outstanding_requests(), 0);
        assert!(coordinator.chains().is_empty());
        assert_eq!(coordinator.unreleased_chains().count(), 0);
        assert!(coordinator.load_standard_effect(0, 0, None).is_err());

        // Idempotent
        coordinator.shutdown();
        drop(coordinator);

        let engine = audio.join().unwrap();
        assert_eq!(engine.chain_count(), 0);
        let state = store.state.lock().unwrap();
        assert_eq!(state.snapshot_saves, 1);
        assert_eq!(state.snapshot.standard.len(), 4);
        assert_eq!(state.snapshot.standard[0].effects[0].id, ECHO_ID);
        assert!(state.snapshot.quick.contains_key("[Channel1]"));
    }

    #[test]
    fn test_shutdown_with_engine_gone() {
        let config = EffectsConfig {
            shutdown_timeout_ms: 5_000,
            ..Default::default()
        };
        let (mut coordinator, engine) = coordinator_with(config, MemoryPresetStore::new());
        drop(engine);
        let started = Instant::now();
        coordinator.shutdown();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(coordinator.is_shut_down());
    }

    #[test]
    fn test_shutdown_timeout_reports_unreleased_chains() {
        let config = EffectsConfig {
            shutdown_timeout_ms: 20,
            ..Default::default()
        };
        let (mut coordinator, engine) = coordinator_with(config, MemoryPresetStore::new());
        let chain_count = coordinator.chains().len();
        coordinator.shutdown();
        assert!(coordinator.is_shut_down());
        assert_eq!(coordinator.outstanding_requests(), chain_count);
        let unreleased: Vec<&str> = coordinator.unreleased_chains().collect();
        assert_eq!(unreleased.len(), chain_count);
        assert!(unreleased.contains(&"[EffectRack1_EffectUnit1]"));
        drop(engine);
    }

    #[test]
    fn test_shutdown_on_drop() {
        let store = MemoryPresetStore::new();
        let (coordinator, engine) = coordinator_with(EffectsConfig::default(), store.clone());
        drop(engine);
        drop(coordinator);
        assert_eq!(store.state.lock().unwrap().snapshot_saves, 1);
    }
}
