//! # Time-Window Aggregator
//!
//! Accumulates "since last reset" deltas for the per-minute scoreboard.
//!
//! The window has no notion of wall-clock time. The host's periodic driver
//! (see [`crate::driver`]) decides when a window ends by calling reset.
//!
//! ## Upgrade Log Bound
//!
//! At most `max_records` upgrade records are kept per window. Records past
//! the cap are counted in `dropped_upgrade_records`; their levels still go
//! into `upgrade_levels`, so:
//!
//! ```text
//! upgrade_levels >= sum(upgrades[i].levels_gained)
//! ```
//!
//! with equality whenever nothing was dropped.

use std::collections::BTreeMap;

use crate::attribution::{AttributedAmounts, Channel};
use crate::currency::{Currency, CurrencyAmounts};
use crate::enchant::EnchantId;

/// One automatic enchantment upgrade.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgradeRecord {
    /// Enchantment that levelled.
    pub enchant: EnchantId,
    /// Levels gained by this upgrade.
    pub levels_gained: u32,
    /// Level after the upgrade.
    pub new_level: u32,
}

/// Everything accumulated since the last reset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Net balance change per currency (credits minus debits).
    pub currency: CurrencyAmounts<i64>,
    /// Credits attributed to the primary tool.
    pub via_primary: AttributedAmounts,
    /// Credits attributed to automated resale.
    pub via_resale: AttributedAmounts,
    /// Blocks broken by the player.
    pub blocks_mined: u64,
    /// Blocks removed by any means (mined plus explosions, lasers, ...).
    pub blocks_destroyed: u64,
    /// Mined block count per material.
    pub mined_by_material: BTreeMap<String, u64>,
    /// Greed enchant procs.
    pub greed_triggers: u64,
    /// Crate keys obtained.
    pub keys_obtained: u64,
    /// Levels gained through auto-upgrade.
    pub upgrade_levels: u64,
    /// Upgrade detail log, oldest first.
    pub upgrades: Vec<UpgradeRecord>,
    /// Records discarded because the log was full.
    pub dropped_upgrade_records: u64,
}

impl WindowSnapshot {
    /// Returns true if nothing happened in this window.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Returns the attributed credits for a channel.
    #[inline]
    #[must_use]
    pub const fn attributed(&self, channel: Channel) -> AttributedAmounts {
        match channel {
            Channel::Primary => self.via_primary,
            Channel::Resale => self.via_resale,
        }
    }
}

/// The live window of one ledger entry.
#[derive(Clone, Debug)]
pub struct TimeWindow {
    current: WindowSnapshot,
    max_records: usize,
}

impl TimeWindow {
    /// Creates an empty window keeping at most `max_records` upgrade records.
    #[must_use]
    pub fn new(max_records: usize) -> Self {
        Self {
            current: WindowSnapshot::default(),
            max_records,
        }
    }

    /// Returns the current window.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> &WindowSnapshot {
        &self.current
    }

    /// Adds a signed balance change.
    pub fn add_currency(&mut self, currency: Currency, delta: i64) {
        let slot = self.current.currency.get_mut(currency);
        *slot = slot.saturating_add(delta);
    }

    /// Adds an attributed credit.
    pub fn add_attributed(&mut self, channel: Channel, currency: Currency, amount: u64) {
        let amounts = match channel {
            Channel::Primary => &mut self.current.via_primary,
            Channel::Resale => &mut self.current.via_resale,
        };
        amounts.add(currency, amount);
    }

    /// Counts one mined block. Mined blocks are also destroyed blocks.
    pub fn record_block_mined(&mut self, material: &str) {
        self.current.blocks_mined = self.current.blocks_mined.saturating_add(1);
        self.current.blocks_destroyed = self.current.blocks_destroyed.saturating_add(1);

        let material = material.trim();
        if !material.is_empty() {
            let count = self
                .current
                .mined_by_material
                .entry(material.to_ascii_lowercase())
                .or_insert(0);
            *count = count.saturating_add(1);
        }
    }

    /// Counts blocks destroyed without being mined.
    pub fn record_blocks_destroyed(&mut self, count: u64) {
        self.current.blocks_destroyed = self.current.blocks_destroyed.saturating_add(count);
    }

    /// Counts one greed proc.
    pub fn record_greed_trigger(&mut self) {
        self.current.greed_triggers = self.current.greed_triggers.saturating_add(1);
    }

    /// Counts obtained crate keys.
    pub fn record_keys_obtained(&mut self, count: u64) {
        self.current.keys_obtained = self.current.keys_obtained.saturating_add(count);
    }

    /// Appends an upgrade record and adds its levels to the window total.
    pub fn record_upgrade(&mut self, record: UpgradeRecord) {
        self.current.upgrade_levels = self
            .current
            .upgrade_levels
            .saturating_add(u64::from(record.levels_gained));

        if self.current.upgrades.len() < self.max_records {
            self.current.upgrades.push(record);
        } else {
            self.current.dropped_upgrade_records = self.current.dropped_upgrade_records.saturating_add(1);
        }
    }

    /// Clears the window, returning what it held.
    pub fn take(&mut self) -> WindowSnapshot {
        std::mem::take(&mut self.current)
    }

    /// Clears the window.
    pub fn reset(&mut self) {
        self.current = WindowSnapshot::default();
    }
}
