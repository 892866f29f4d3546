//! # Source-Attributed Accounting
//!
//! Tracks how much of each credited currency came through a specific
//! channel: the player's pickaxe, or the automated resale of mined blocks.
//!
//! Attribution is statistics only. It grows with channel credits and is
//! never reduced by spending. The invariant checked by [`SourceAttribution::audit`]:
//!
//! ```text
//! primary[c] + resale[c] <= lifetime_credited[c]
//! ```

use serde::{Deserialize, Serialize};

use crate::currency::{Balances, Currency};
use crate::error::{LedgerError, LedgerResult};

/// The path a credit arrived through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// Earned directly by the primary tool (pickaxe enchant procs, block rewards).
    Primary,
    /// Earned by the automated resale of mined drops.
    Resale,
}

/// Attributed totals for the three attributable currencies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributedAmounts {
    /// Coins.
    pub coins: u64,
    /// Tokens.
    pub tokens: u64,
    /// Experience.
    pub experience: u64,
}

impl AttributedAmounts {
    /// Returns the attributed amount. Beacons are always zero.
    #[inline]
    #[must_use]
    pub const fn get(&self, currency: Currency) -> u64 {
        match currency {
            Currency::Coins => self.coins,
            Currency::Tokens => self.tokens,
            Currency::Experience => self.experience,
            Currency::Beacons => 0,
        }
    }

    fn slot_mut(&mut self, currency: Currency) -> Option<&mut u64> {
        match currency {
            Currency::Coins => Some(&mut self.coins),
            Currency::Tokens => Some(&mut self.tokens),
            Currency::Experience => Some(&mut self.experience),
            Currency::Beacons => None,
        }
    }

    /// Adds to the attributed amount. Returns false for beacons.
    pub fn add(&mut self, currency: Currency, amount: u64) -> bool {
        match self.slot_mut(currency) {
            Some(slot) => {
                *slot = slot.saturating_add(amount);
                true
            }
            None => false,
        }
    }
}

/// Per-channel attribution counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SourceAttribution {
    primary: AttributedAmounts,
    resale: AttributedAmounts,
}

impl SourceAttribution {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores counters from persisted values.
    #[must_use]
    pub const fn from_parts(primary: AttributedAmounts, resale: AttributedAmounts) -> Self {
        Self { primary, resale }
    }

    /// Returns the counters of one channel.
    #[inline]
    #[must_use]
    pub const fn channel(&self, channel: Channel) -> AttributedAmounts {
        match channel {
            Channel::Primary => self.primary,
            Channel::Resale => self.resale,
        }
    }

    /// Returns the attributed amount for a channel and currency.
    #[inline]
    #[must_use]
    pub const fn get(&self, channel: Channel, currency: Currency) -> u64 {
        self.channel(channel).get(currency)
    }

    /// Records a channel credit. Returns false if the currency is not attributable.
    pub fn record(&mut self, channel: Channel, currency: Currency, amount: u64) -> bool {
        match channel {
            Channel::Primary => self.primary.add(currency, amount),
            Channel::Resale => self.resale.add(currency, amount),
        }
    }

    /// Checks attribution against lifetime credits.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::AttributionOverflow`] for the first currency
    /// whose channels together exceed what was ever credited.
    pub fn audit(&self, balances: &Balances) -> LedgerResult<()> {
        for currency in Currency::ALL {
            let attributed = self
                .primary
                .get(currency)
                .saturating_add(self.resale.get(currency));
            let credited = balances.lifetime_credited(currency);
            if attributed > credited {
                return Err(LedgerError::AttributionOverflow {
                    currency,
                    attributed,
                    credited,
                });
            }
        }
        Ok(())
    }
}
