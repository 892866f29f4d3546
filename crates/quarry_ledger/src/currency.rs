//! # Balance Store
//!
//! Raw currency counters for one player.
//!
//! ## Policies
//!
//! - `credit` takes an unsigned amount; a balance can only go up.
//! - `debit` is all-or-nothing: insufficient funds leave the balance alone.
//! - `adjust` is the signed admin path and clamps at zero.
//!
//! Balances are `u64`, so "never negative" holds by construction.
//! Additions saturate at `u64::MAX`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// A tracked currency or resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    /// Main spendable currency, earned from selling.
    Coins,
    /// Premium mining currency, spent on enchantments.
    Tokens,
    /// Vanilla experience points.
    Experience,
    /// Rare drop used for prestige upgrades.
    Beacons,
}

impl Currency {
    /// Every currency, in storage order.
    pub const ALL: [Self; 4] = [Self::Coins, Self::Tokens, Self::Experience, Self::Beacons];

    /// Stable lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Coins => "coins",
            Self::Tokens => "tokens",
            Self::Experience => "experience",
            Self::Beacons => "beacons",
        }
    }

    /// Returns true if credits in this currency can be attributed to a channel.
    ///
    /// Beacons only drop from mining itself, so there is nothing to split.
    #[inline]
    #[must_use]
    pub const fn is_attributable(self) -> bool {
        !matches!(self, Self::Beacons)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Currency {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "coins" | "coin" | "money" => Ok(Self::Coins),
            "tokens" | "token" => Ok(Self::Tokens),
            "experience" | "exp" | "xp" => Ok(Self::Experience),
            "beacons" | "beacon" => Ok(Self::Beacons),
            _ => Err(LedgerError::UnknownCurrency(s.to_string())),
        }
    }
}

/// One value per currency.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyAmounts<T> {
    /// Coins.
    pub coins: T,
    /// Tokens.
    pub tokens: T,
    /// Experience.
    pub experience: T,
    /// Beacons.
    pub beacons: T,
}

impl<T: Copy> CurrencyAmounts<T> {
    /// Returns the value for a currency.
    #[inline]
    #[must_use]
    pub const fn get(&self, currency: Currency) -> T {
        match currency {
            Currency::Coins => self.coins,
            Currency::Tokens => self.tokens,
            Currency::Experience => self.experience,
            Currency::Beacons => self.beacons,
        }
    }

    /// Returns a mutable reference to the value for a currency.
    #[inline]
    pub fn get_mut(&mut self, currency: Currency) -> &mut T {
        match currency {
            Currency::Coins => &mut self.coins,
            Currency::Tokens => &mut self.tokens,
            Currency::Experience => &mut self.experience,
            Currency::Beacons => &mut self.beacons,
        }
    }
}

/// Converts an unsigned amount into a window delta, saturating.
#[inline]
pub(crate) fn signed(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}

/// Currency balances plus lifetime credit totals.
///
/// Lifetime credits are the denominator for the attribution invariant: no
/// channel can have earned more than the total ever credited.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Balances {
    /// Current spendable balances.
    current: CurrencyAmounts<u64>,
    /// Sum of every credit ever applied.
    lifetime_credited: CurrencyAmounts<u64>,
}

impl Balances {
    /// Creates zeroed balances.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores balances from persisted values.
    #[must_use]
    pub const fn from_parts(current: CurrencyAmounts<u64>, lifetime_credited: CurrencyAmounts<u64>) -> Self {
        Self {
            current,
            lifetime_credited,
        }
    }

    /// Returns the balance of a currency.
    #[inline]
    #[must_use]
    pub const fn get(&self, currency: Currency) -> u64 {
        self.current.get(currency)
    }

    /// Returns every balance.
    #[inline]
    #[must_use]
    pub const fn amounts(&self) -> CurrencyAmounts<u64> {
        self.current
    }

    /// Returns the lifetime credits of a currency.
    #[inline]
    #[must_use]
    pub const fn lifetime_credited(&self, currency: Currency) -> u64 {
        self.lifetime_credited.get(currency)
    }

    /// Returns every lifetime credit total.
    #[inline]
    #[must_use]
    pub const fn lifetime_amounts(&self) -> CurrencyAmounts<u64> {
        self.lifetime_credited
    }

    /// Adds `amount` to a balance. Returns the amount actually applied.
    ///
    /// The applied amount is smaller than `amount` only when the balance
    /// saturates at `u64::MAX`.
    pub fn credit(&mut self, currency: Currency, amount: u64) -> u64 {
        let balance = self.current.get_mut(currency);
        let before = *balance;
        *balance = before.saturating_add(amount);
        let applied = *balance - before;

        let lifetime = self.lifetime_credited.get_mut(currency);
        *lifetime = lifetime.saturating_add(applied);
        applied
    }

    /// Removes `amount` from a balance if it is covered.
    ///
    /// Returns false and leaves the balance untouched otherwise.
    pub fn debit(&mut self, currency: Currency, amount: u64) -> bool {
        let balance = self.current.get_mut(currency);
        match balance.checked_sub(amount) {
            Some(rest) => {
                *balance = rest;
                true
            }
            None => false,
        }
    }

    /// Applies a signed delta, clamping the result at zero.
    ///
    /// Returns the delta actually applied.
    pub fn adjust(&mut self, currency: Currency, delta: i64) -> i64 {
        if delta >= 0 {
            return signed(self.credit(currency, delta.unsigned_abs()));
        }

        let balance = self.current.get_mut(currency);
        let taken = delta.unsigned_abs().min(*balance);
        *balance -= taken;
        -signed(taken)
    }

    /// Overwrites a balance. Negative values clamp to zero.
    ///
    /// Load path only: lifetime credits are not touched.
    pub fn set_absolute(&mut self, currency: Currency, value: i64) {
        *self.current.get_mut(currency) = u64::try_from(value).unwrap_or(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_and_debit() {
        let mut balances = Balances::new();
        assert_eq!(balances.credit(Currency::Tokens, 50), 50);
        assert!(balances.debit(Currency::Tokens, 20));
        assert_eq!(balances.get(Currency::Tokens), 30);
        assert_eq!(balances.lifetime_credited(Currency::Tokens), 50);
    }

    #[test]
    fn test_debit_is_all_or_nothing() {
        let mut balances = Balances::new();
        balances.credit(Currency::Coins, 10);

        assert!(!balances.debit(Currency::Coins, 11));
        assert_eq!(balances.get(Currency::Coins), 10);

        assert!(balances.debit(Currency::Coins, 10));
        assert_eq!(balances.get(Currency::Coins), 0);
    }

    #[test]
    fn test_credit_saturates() {
        let mut balances = Balances::new();
        balances.set_absolute(Currency::Beacons, i64::MAX);
        balances.credit(Currency::Beacons, u64::MAX);
        assert_eq!(balances.get(Currency::Beacons), u64::MAX);
    }

    #[test]
    fn test_adjust_clamps_at_zero() {
        let mut balances = Balances::new();
        balances.credit(Currency::Experience, 5);

        assert_eq!(balances.adjust(Currency::Experience, -8), -5);
        assert_eq!(balances.get(Currency::Experience), 0);

        assert_eq!(balances.adjust(Currency::Experience, 3), 3);
        assert_eq!(balances.lifetime_credited(Currency::Experience), 8);
    }

    #[test]
    fn test_set_absolute_clamps_negative() {
        let mut balances = Balances::new();
        balances.set_absolute(Currency::Coins, -40);
        assert_eq!(balances.get(Currency::Coins), 0);

        balances.set_absolute(Currency::Coins, 1234);
        assert_eq!(balances.get(Currency::Coins), 1234);
        assert_eq!(balances.lifetime_credited(Currency::Coins), 0);
    }

    #[test]
    fn test_currency_parsing() {
        assert_eq!("Tokens".parse::<Currency>(), Ok(Currency::Tokens));
        assert_eq!(" xp ".parse::<Currency>(), Ok(Currency::Experience));
        assert!(matches!(
            "gems".parse::<Currency>(),
            Err(LedgerError::UnknownCurrency(_))
        ));
        assert_eq!(Currency::Beacons.to_string(), "beacons");
    }
}
