//! # Enchantment Levels
//!
//! Enchantments are plugin-defined, so identifiers are strings validated at
//! the boundary rather than a closed enum. A missing entry means level 0.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Maximum identifier length.
pub const MAX_ENCHANT_ID_LEN: usize = 48;

/// A validated, lowercase enchantment identifier.
///
/// Accepted characters: `a-z`, `0-9`, `_`, `-`, `:`. Input is lowercased.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EnchantId(String);

impl EnchantId {
    /// Parses an identifier, returning `None` if it is malformed.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let id = raw.to_ascii_lowercase();
        let valid = !id.is_empty()
            && id.len() <= MAX_ENCHANT_ID_LEN
            && id
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'-' | b':'));
        valid.then_some(Self(id))
    }

    /// Returns the identifier text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnchantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EnchantId {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or(LedgerError::InvalidIdentifier(value))
    }
}

impl From<EnchantId> for String {
    fn from(id: EnchantId) -> Self {
        id.0
    }
}

/// Enchantment levels for one player's primary tool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnchantmentLevels {
    levels: BTreeMap<EnchantId, u32>,
}

impl EnchantmentLevels {
    /// Creates an empty level table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores levels from a persisted map. Zero levels are dropped.
    #[must_use]
    pub fn from_map(mut levels: BTreeMap<EnchantId, u32>) -> Self {
        levels.retain(|_, level| *level > 0);
        Self { levels }
    }

    /// Returns the level of an enchantment, 0 if absent.
    #[inline]
    #[must_use]
    pub fn get(&self, id: &EnchantId) -> u32 {
        self.levels.get(id).copied().unwrap_or(0)
    }

    /// Sets a level. Level 0 removes the entry.
    pub fn set(&mut self, id: EnchantId, level: u32) {
        if level == 0 {
            self.levels.remove(&id);
        } else {
            self.levels.insert(id, level);
        }
    }

    /// Returns a copy of every non-zero level.
    #[must_use]
    pub fn to_map(&self) -> BTreeMap<EnchantId, u32> {
        self.levels.clone()
    }
}
