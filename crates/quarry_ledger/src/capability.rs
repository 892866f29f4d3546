//! # Auto-Upgrade Tracker
//!
//! Which enchantments the player has flagged for automatic levelling.
//!
//! Plain set semantics. The "only one auto-upgrade at a time" rule belongs
//! to the upgrade collaborator; this store keeps whatever it is given.

use std::collections::BTreeSet;

use crate::enchant::EnchantId;

/// Set of enchantments with auto-upgrade enabled.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AutoUpgrades {
    enabled: BTreeSet<EnchantId>,
}

impl AutoUpgrades {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a persisted set.
    #[must_use]
    pub const fn from_set(enabled: BTreeSet<EnchantId>) -> Self {
        Self { enabled }
    }

    /// Enables auto-upgrade. Returns true if it was not already enabled.
    pub fn enable(&mut self, id: EnchantId) -> bool {
        self.enabled.insert(id)
    }

    /// Disables auto-upgrade. Returns true if it was enabled.
    pub fn disable(&mut self, id: &EnchantId) -> bool {
        self.enabled.remove(id)
    }

    /// Returns true if auto-upgrade is enabled.
    #[must_use]
    pub fn is_enabled(&self, id: &EnchantId) -> bool {
        self.enabled.contains(id)
    }

    /// Returns a copy of the enabled set.
    #[must_use]
    pub fn to_set(&self) -> BTreeSet<EnchantId> {
        self.enabled.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_semantics() {
        let fortune = EnchantId::parse("fortune").unwrap();
        let greed = EnchantId::parse("greed").unwrap();
        let mut upgrades = AutoUpgrades::new();

        assert!(upgrades.enable(fortune.clone()));
        assert!(!upgrades.enable(fortune.clone()));
        assert!(upgrades.enable(greed.clone()));
        assert_eq!(upgrades.to_set().len(), 2);

        assert!(upgrades.disable(&fortune));
        assert!(!upgrades.disable(&fortune));
        assert!(!upgrades.is_enabled(&fortune));
        assert!(upgrades.is_enabled(&greed));
    }

    #[test]
    fn test_copy_is_detached() {
        let mut upgrades = AutoUpgrades::new();
        upgrades.enable(EnchantId::parse("efficiency").unwrap());

        let mut copy = upgrades.to_set();
        copy.clear();
        assert_eq!(upgrades.to_set().len(), 1);
    }
}
