//! # Ledger Snapshot
//!
//! Everything a persistence collaborator needs to rebuild an entry.
//! The live window is transient and is not part of a snapshot.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::attribution::AttributedAmounts;
use crate::buffs::AbundanceTimers;
use crate::currency::{Currency, CurrencyAmounts};
use crate::enchant::EnchantId;

/// Persisted state of one ledger entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Blocks mined over the player's lifetime.
    #[serde(default)]
    pub lifetime_blocks_mined: u64,
    /// Blocks destroyed over the player's lifetime.
    #[serde(default)]
    pub lifetime_blocks_destroyed: u64,
    /// Combustion level.
    #[serde(default)]
    pub combustion: u32,
    /// Enchantments with auto-upgrade enabled.
    #[serde(default)]
    pub auto_upgrades: BTreeSet<EnchantId>,
    /// Custom permissions.
    #[serde(default)]
    pub permissions: BTreeSet<String>,
    /// Current balances.
    pub balances: CurrencyAmounts<u64>,
    /// Lifetime credits per currency.
    pub lifetime_credited: CurrencyAmounts<u64>,
    /// Credits attributed to the primary tool.
    #[serde(default)]
    pub via_primary: AttributedAmounts,
    /// Credits attributed to automated resale.
    #[serde(default)]
    pub via_resale: AttributedAmounts,
    /// Abundance timestamps.
    #[serde(default)]
    pub abundance: AbundanceTimers,
    /// Non-zero enchantment levels.
    #[serde(default)]
    pub enchantments: BTreeMap<EnchantId, u32>,
}

impl LedgerSnapshot {
    /// Combines stored state with state that accumulated on a live entry
    /// before the stored state was loaded.
    ///
    /// Counters add and sets are unioned. Enchantment levels and abundance
    /// timers that the live side set take precedence.
    #[must_use]
    pub fn merged_with(&self, live: &Self) -> Self {
        let mut enchantments = self.enchantments.clone();
        enchantments.extend(live.enchantments.iter().map(|(id, level)| (id.clone(), *level)));

        Self {
            lifetime_blocks_mined: self.lifetime_blocks_mined.saturating_add(live.lifetime_blocks_mined),
            lifetime_blocks_destroyed: self
                .lifetime_blocks_destroyed
                .saturating_add(live.lifetime_blocks_destroyed),
            combustion: self.combustion.saturating_add(live.combustion),
            auto_upgrades: self.auto_upgrades.union(&live.auto_upgrades).cloned().collect(),
            permissions: self.permissions.union(&live.permissions).cloned().collect(),
            balances: add_amounts(self.balances, live.balances),
            lifetime_credited: add_amounts(self.lifetime_credited, live.lifetime_credited),
            via_primary: add_attributed(self.via_primary, live.via_primary),
            via_resale: add_attributed(self.via_resale, live.via_resale),
            abundance: if live.abundance == AbundanceTimers::default() {
                self.abundance
            } else {
                live.abundance
            },
            enchantments,
        }
    }
}

fn add_amounts(mut a: CurrencyAmounts<u64>, b: CurrencyAmounts<u64>) -> CurrencyAmounts<u64> {
    for currency in Currency::ALL {
        let slot = a.get_mut(currency);
        *slot = slot.saturating_add(b.get(currency));
    }
    a
}

fn add_attributed(a: AttributedAmounts, b: AttributedAmounts) -> AttributedAmounts {
    AttributedAmounts {
        coins: a.coins.saturating_add(b.coins),
        tokens: a.tokens.saturating_add(b.tokens),
        experience: a.experience.saturating_add(b.experience),
    }
}
