//! Processing-group handles
//!
//! Every audio processing group (a deck, the main output, the headphone bus)
//! is identified by a group name like `[Channel1]` on the control side and by a
//! small integer handle on the audio thread. Chains route by handle so the
//! engine never compares strings.

use std::collections::HashMap;

/// Maximum number of distinct processing groups (one bit each in [`ChannelMask`])
pub const MAX_CHANNELS: usize = 64;

/// Group name of the main output
pub const MAIN_OUTPUT_GROUP: &str = "[Master]";

/// Integer handle of a processing group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelHandle(u8);

impl ChannelHandle {
    /// Raw handle value (0-63)
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A channel handle together with its group name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelHandleAndGroup {
    pub handle: ChannelHandle,
    pub group: String,
}

/// Assigns stable handles to group names
///
/// Handles are handed out in registration order and never reused.
#[derive(Debug, Default)]
pub struct ChannelHandleFactory {
    handles: HashMap<String, ChannelHandle>,
}

impl ChannelHandleFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the handle for a group, creating one if the group is new
    ///
    /// Returns `None` once [`MAX_CHANNELS`] groups exist.
    pub fn get_or_create(&mut self, group: &str) -> Option<ChannelHandleAndGroup> {
        if let Some(handle) = self.handles.get(group) {
            return Some(ChannelHandleAndGroup {
                handle: *handle,
                group: group.to_string(),
            });
        }
        if self.handles.len() >= MAX_CHANNELS {
            log::error!("Cannot create channel handle for {}: all {} handles in use", group, MAX_CHANNELS);
            return None;
        }
        let handle = ChannelHandle(self.handles.len() as u8);
        self.handles.insert(group.to_string(), handle);
        Some(ChannelHandleAndGroup {
            handle,
            group: group.to_string(),
        })
    }

    /// Look up an existing handle
    pub fn handle(&self, group: &str) -> Option<ChannelHandle> {
        self.handles.get(group).copied()
    }
}

/// Fixed-size set of channel handles, usable on the audio thread
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelMask(u64);

impl ChannelMask {
    pub const EMPTY: ChannelMask = ChannelMask(0);

    #[inline]
    pub fn insert(&mut self, handle: ChannelHandle) {
        self.0 |= 1u64 << handle.0;
    }

    #[inline]
    pub fn remove(&mut self, handle: ChannelHandle) {
        self.0 &= !(1u64 << handle.0);
    }

    #[inline]
    pub fn contains(&self, handle: ChannelHandle) -> bool {
        self.0 & (1u64 << handle.0) != 0
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}
