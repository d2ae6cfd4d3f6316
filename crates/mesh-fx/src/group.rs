//! Composite control keys used by mapping and control lookups
//!
//! Effect slots are addressed by group names such as
//! `[EffectRack1_EffectUnit2_Effect3]` or `[EqualizerRack1_[Channel1]_Effect1]`,
//! and their parameters by keys such as `parameter2` or `button_parameter1`.
//! Only these exact shapes parse; anything else is a [`GroupKeyError`].

use std::fmt;
use std::str::FromStr;

use crate::chain::{effect_slot_group, parse_one_based, ChainKind, EQUALIZER_RACK, GROUP_SEPARATOR, OUTPUT_RACK, QUICK_RACK, STANDARD_RACK};
use crate::error::GroupKeyError;
use crate::manifest::ParameterKind;

const EFFECT_PREFIX: &str = "Effect";
const KNOB_PREFIX: &str = "parameter";
const BUTTON_PREFIX: &str = "button_parameter";

/// A parsed effect slot group: which chain, which slot (0-based)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EffectSlotKey {
    pub chain: ChainKind,
    pub slot: usize,
}

impl EffectSlotKey {
    pub fn new(chain: ChainKind, slot: usize) -> Self {
        Self { chain, slot }
    }

    /// Parse `[<rack>_<unit or deck>_Effect<N>]` with N >= 1
    pub fn parse(group: &str) -> Result<Self, GroupKeyError> {
        let malformed = || GroupKeyError::MalformedGroup(group.to_string());

        let parts: Vec<&str> = group.split(GROUP_SEPARATOR).collect();
        let [rack, _, effect] = parts.as_slice() else {
            return Err(malformed());
        };
        if ![STANDARD_RACK, OUTPUT_RACK, QUICK_RACK, EQUALIZER_RACK].contains(rack) {
            return Err(GroupKeyError::UnknownRack(group.to_string()));
        }

        let number = effect
            .strip_prefix(EFFECT_PREFIX)
            .and_then(|rest| rest.strip_suffix(']'))
            .and_then(parse_one_based)
            .ok_or_else(malformed)?;

        // Everything before the last separator, closed again, is the chain group
        let chain_len = group.len() - effect.len() - 1;
        let chain_group = format!("{}]", &group[..chain_len]);
        let chain = ChainKind::from_group(&chain_group).ok_or_else(malformed)?;

        Ok(Self {
            chain,
            slot: number - 1,
        })
    }

    pub fn chain_group(&self) -> String {
        self.chain.group()
    }

    /// Canonical group name of the slot
    pub fn group(&self) -> String {
        effect_slot_group(&self.chain.group(), self.slot)
    }
}

impl FromStr for EffectSlotKey {
    type Err = GroupKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EffectSlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.group())
    }
}

/// A parsed parameter key: kind plus 0-based index among shown parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterKey {
    pub kind: ParameterKind,
    pub index: usize,
}

impl ParameterKey {
    /// Parse `parameter<N>` or `button_parameter<N>` with N >= 1
    pub fn parse(key: &str) -> Result<Self, GroupKeyError> {
        let (kind, digits) = if let Some(rest) = key.strip_prefix(BUTTON_PREFIX) {
            (ParameterKind::Button, rest)
        } else if let Some(rest) = key.strip_prefix(KNOB_PREFIX) {
            (ParameterKind::Knob, rest)
        } else {
            return Err(GroupKeyError::MalformedParameter(key.to_string()));
        };

        match parse_one_based(digits) {
            Some(n) => Ok(Self { kind, index: n - 1 }),
            None => Err(GroupKeyError::MalformedParameter(key.to_string())),
        }
    }
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            ParameterKind::Knob => KNOB_PREFIX,
            ParameterKind::Button => BUTTON_PREFIX,
        };
        write!(f, "{}{}", prefix, self.index + 1)
    }
}
