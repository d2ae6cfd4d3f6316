//! The saved chain-preset library, in user order

use super::ChainPreset;

/// Ordered list of saved chain presets
///
/// Chains remember which entry they were loaded from by index, so the order
/// is significant and only changes through this type.
#[derive(Debug, Clone, Default)]
pub struct ChainPresetManager {
    presets: Vec<ChainPreset>,
}

impl ChainPresetManager {
    pub fn new(presets: Vec<ChainPreset>) -> Self {
        Self { presets }
    }

    pub fn presets(&self) -> &[ChainPreset] {
        &self.presets
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    /// Index of a preset by name
    pub fn preset_index(&self, name: &str) -> Option<usize> {
        self.presets.iter().position(|p| p.name == name)
    }

    pub fn preset_at(&self, index: usize) -> Option<&ChainPreset> {
        self.presets.get(index)
    }

    pub fn preset(&self, name: &str) -> Option<&ChainPreset> {
        self.presets.iter().find(|p| p.name == name)
    }

    /// Index `delta` steps away from `current`, wrapping around
    ///
    /// With no current index, a positive step starts at the first preset and
    /// a negative one at the last.
    pub fn step(&self, current: Option<usize>, delta: i32) -> Option<usize> {
        let len = self.presets.len() as i64;
        if len == 0 {
            return None;
        }
        let start = match current {
            Some(index) => index as i64,
            None if delta > 0 => -1,
            None => len,
        };
        Some((start + delta as i64).rem_euclid(len) as usize)
    }

    /// Add a preset, replacing one with the same name in place
    ///
    /// Returns the preset's index.
    pub fn save_preset(&mut self, preset: ChainPreset) -> usize {
        match self.preset_index(&preset.name) {
            Some(index) => {
                log::info!("Replacing chain preset '{}'", preset.name);
                self.presets[index] = preset;
                index
            }
            None => {
                log::info!("Adding chain preset '{}'", preset.name);
                self.presets.push(preset);
                self.presets.len() - 1
            }
        }
    }

    /// Remove a preset by name
    pub fn delete_preset(&mut self, name: &str) -> bool {
        match self.preset_index(name) {
            Some(index) => {
                self.presets.remove(index);
                true
            }
            None => false,
        }
    }
}
