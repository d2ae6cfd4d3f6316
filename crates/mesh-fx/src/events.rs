//! Coordinator events for observers (UI, controller mapping)
//!
//! Every [`EventBus::subscribe`] call gets its own bounded crossbeam
//! channel, so observers never compete for events. Publishing never blocks
//! the control thread: a subscriber that stops draining loses events once
//! its queue is full, and dropped receivers are forgotten on the next
//! publish. Events published before a subscription are not replayed.

use crossbeam::channel::{Receiver, Sender, TrySendError};

/// Default number of undelivered events each subscriber queue holds
pub const EVENT_BUS_CAPACITY: usize = 256;

/// State changes published by the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum EffectsEvent {
    /// The catalogue changed; total number of known effects
    EffectsAvailable(usize),

    /// An effect was shown or hidden
    VisibleEffectsChanged,

    /// A slot was loaded (`None` = unloaded)
    EffectLoaded {
        group: String,
        unique_id: Option<String>,
    },

    /// A chain preset was applied to a chain
    ChainPresetLoaded {
        chain: String,
        name: String,
        /// Position in the saved-preset library, if the preset is in it
        index: Option<usize>,
    },

    /// The saved chain-preset library changed; new number of presets
    PresetLibraryChanged(usize),

    /// The default preset of an effect was replaced
    DefaultPresetSaved { unique_id: String },
}

/// Fan-out event bus, one queue per subscriber
pub struct EventBus {
    capacity: usize,
    subscribers: Vec<Sender<EffectsEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            subscribers: Vec::new(),
        }
    }

    /// New receiver that sees every event published from now on
    pub fn subscribe(&mut self) -> Receiver<EffectsEvent> {
        let (sender, receiver) = crossbeam::channel::bounded(self.capacity);
        self.subscribers.push(sender);
        receiver
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Publish without blocking; returns how many subscribers got the event
    pub fn publish(&mut self, event: EffectsEvent) -> usize {
        let mut delivered = 0;
        self.subscribers.retain(|sender| match sender.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(event)) => {
                log::trace!("Event queue full, dropping {:?}", event);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        delivered
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_BUS_CAPACITY)
    }
}
