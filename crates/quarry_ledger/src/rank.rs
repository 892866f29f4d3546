//! # Rank Derivation
//!
//! Mine ranks are single letters granted through permissions of the form
//! `<prefix>.<letter>`, e.g. `quarry.mine.f`. The highest letter present is
//! the player's rank, and a rank unlocks every letter at or below it.
//! Rank `a` is always unlocked.
//!
//! Derivation runs against the live permission set on every call.

use std::collections::BTreeSet;

/// Maximum permission string length.
pub const MAX_PERMISSION_LEN: usize = 128;

/// The rank everyone has.
pub const BASE_RANK: char = 'a';

/// Opaque permission strings held by one player.
///
/// Strings are stored and matched exactly as granted. Empty strings, strings
/// with whitespace and strings longer than [`MAX_PERMISSION_LEN`] are
/// refused. Only rank derivation ignores case.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Permissions {
    granted: BTreeSet<String>,
}

impl Permissions {
    /// Creates an empty permission set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a persisted set, dropping malformed entries.
    #[must_use]
    pub fn from_set(granted: BTreeSet<String>) -> Self {
        Self {
            granted: granted.into_iter().filter(|perm| is_valid(perm)).collect(),
        }
    }

    /// Grants a permission. Returns true if it was newly added.
    pub fn grant(&mut self, permission: &str) -> bool {
        is_valid(permission) && self.granted.insert(permission.to_string())
    }

    /// Revokes a permission. Returns true if it was present.
    pub fn revoke(&mut self, permission: &str) -> bool {
        self.granted.remove(permission)
    }

    /// Returns true if the permission is held.
    #[must_use]
    pub fn contains(&self, permission: &str) -> bool {
        self.granted.contains(permission)
    }

    /// Returns a copy of every held permission.
    #[must_use]
    pub fn to_set(&self) -> BTreeSet<String> {
        self.granted.clone()
    }

    /// Returns the highest rank letter granted under `prefix`.
    #[must_use]
    pub fn highest_rank(&self, prefix: &str) -> Option<char> {
        self.granted.iter().filter_map(|perm| rank_of(perm, prefix)).max()
    }
}

fn is_valid(permission: &str) -> bool {
    !permission.is_empty()
        && permission.len() <= MAX_PERMISSION_LEN
        && !permission.chars().any(char::is_whitespace)
}

/// Extracts the rank letter from `<prefix>.<letter>`, ignoring case.
///
/// `prefix` is expected in lowercase.
fn rank_of(permission: &str, prefix: &str) -> Option<char> {
    let lowered = permission.to_ascii_lowercase();
    let rest = lowered.strip_prefix(prefix)?.strip_prefix('.')?;
    let mut chars = rest.chars();
    match (chars.next(), chars.next()) {
        (Some(letter), None) if letter.is_ascii_lowercase() => Some(letter),
        _ => None,
    }
}

/// Returns true if a player whose highest rank is `highest` may access `target`.
///
/// The target is compared case-insensitively. Rank `a` is always accessible;
/// anything that is not a letter never is.
#[must_use]
pub fn has_access(highest: Option<char>, target: char) -> bool {
    let target = target.to_ascii_lowercase();
    if target == BASE_RANK {
        return true;
    }
    target.is_ascii_lowercase() && highest.is_some_and(|rank| rank >= target)
}
