//! Chain kinds and the per-kind configuration record
//!
//! The four chain variants share one [`ChainSlot`](super::ChainSlot) type.
//! Everything that differs between them is data returned from here: the
//! group name, which channels the chain binds to, and whether the mix can be
//! changed.

use std::fmt;

use crate::channel::MAIN_OUTPUT_GROUP;

/// Group prefix of the standard effect units
pub const STANDARD_RACK: &str = "[EffectRack1";
/// Group prefix of the main output chain
pub const OUTPUT_RACK: &str = "[OutputEffectRack";
/// Group prefix of the per-deck quick chains
pub const QUICK_RACK: &str = "[QuickEffectRack1";
/// Group prefix of the per-deck equalizer chains
pub const EQUALIZER_RACK: &str = "[EqualizerRack1";
/// Separator between group name components
pub const GROUP_SEPARATOR: char = '_';

/// Which chain a slot belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChainKind {
    /// Standard effect unit (1-based)
    Standard { unit: usize },
    /// The chain on the main output
    Output,
    /// Quick effect chain of a deck
    Quick { deck: String },
    /// Equalizer chain of a deck
    Equalizer { deck: String },
}

/// Channel binding of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPolicy {
    /// Every input and output channel the coordinator knows, present and future
    AllChannels,
    /// The chain's own deck only, always enabled
    Deck,
    /// The main output only, always enabled
    MainOutput,
}

/// Whether mix mode and amount are user controlled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixControl {
    Full,
    /// Always dry/wet, fully wet
    Fixed,
}

/// Per-kind behavior of a chain slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainConfig {
    pub channels: ChannelPolicy,
    pub mix: MixControl,
}

impl ChainKind {
    /// Stable group name, unique across the coordinator
    pub fn group(&self) -> String {
        match self {
            ChainKind::Standard { unit } => format!("{}_EffectUnit{}]", STANDARD_RACK, unit),
            ChainKind::Output => format!("{}_{}]", OUTPUT_RACK, MAIN_OUTPUT_GROUP),
            ChainKind::Quick { deck } => format!("{}_{}]", QUICK_RACK, deck),
            ChainKind::Equalizer { deck } => format!("{}_{}]", EQUALIZER_RACK, deck),
        }
    }

    pub fn config(&self) -> ChainConfig {
        match self {
            ChainKind::Standard { .. } => ChainConfig {
                channels: ChannelPolicy::AllChannels,
                mix: MixControl::Full,
            },
            ChainKind::Output => ChainConfig {
                channels: ChannelPolicy::MainOutput,
                mix: MixControl::Full,
            },
            ChainKind::Quick { .. } | ChainKind::Equalizer { .. } => ChainConfig {
                channels: ChannelPolicy::Deck,
                mix: MixControl::Fixed,
            },
        }
    }

    /// Deck group for per-deck chains
    pub fn deck(&self) -> Option<&str> {
        match self {
            ChainKind::Quick { deck } | ChainKind::Equalizer { deck } => Some(deck),
            _ => None,
        }
    }

    /// Parse a chain group name back into its kind
    pub fn from_group(group: &str) -> Option<ChainKind> {
        let inner = group.strip_suffix(']')?;
        let (rack, rest) = inner.split_once(GROUP_SEPARATOR)?;
        match rack {
            STANDARD_RACK => {
                let unit = parse_one_based(rest.strip_prefix("EffectUnit")?)?;
                Some(ChainKind::Standard { unit })
            }
            OUTPUT_RACK if rest == MAIN_OUTPUT_GROUP => Some(ChainKind::Output),
            QUICK_RACK if is_bracketed(rest) => Some(ChainKind::Quick {
                deck: rest.to_string(),
            }),
            EQUALIZER_RACK if is_bracketed(rest) => Some(ChainKind::Equalizer {
                deck: rest.to_string(),
            }),
            _ => None,
        }
    }
}

/// Parse a 1-based number as written in group names: ASCII digits only, no
/// sign and no leading zero
pub(crate) fn parse_one_based(digits: &str) -> Option<usize> {
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn is_bracketed(group: &str) -> bool {
    group.len() > 2 && group.starts_with('[') && group.ends_with(']') && !group.contains(GROUP_SEPARATOR)
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.group())
    }
}

/// Group name of effect slot `index` (0-based) in chain `chain_group`
pub fn effect_slot_group(chain_group: &str, index: usize) -> String {
    let stem = chain_group.strip_suffix(']').unwrap_or(chain_group);
    format!("{}_Effect{}]", stem, index + 1)
}
