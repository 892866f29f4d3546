//! # QUARRY Ledger
//!
//! Per-player economic ledger for the QUARRY mining server.
//!
//! ## Design Principles
//!
//! 1. **Integer money** - Balances are `u64`, signed adjustments saturate at zero
//! 2. **One lock per player** - Every entry operation is a single critical section
//! 3. **Pull-based timers** - Abundance expiry is evaluated on read, no timer threads
//! 4. **External configuration** - Tunables live in TOML
//!
//! ## Thread Safety
//!
//! [`LedgerEntry`] is `Send + Sync` and is shared as `Arc<LedgerEntry>`.
//! Concurrent credits and debits against one player never lose an update.
//! The [`LedgerRegistry`] map lock is never held while an entry is locked.
//!
//! ## Example
//!
//! ```rust
//! use quarry_ledger::{Currency, LedgerConfig, LedgerRegistry};
//!
//! let registry = LedgerRegistry::new(LedgerConfig::default());
//! let ledger = registry.get_or_create(42);
//!
//! ledger.credit_via_primary(Currency::Tokens, 250);
//! assert!(ledger.debit(Currency::Tokens, 100));
//! assert_eq!(ledger.balance(Currency::Tokens), 150);
//! assert_eq!(ledger.window_currency(Currency::Tokens), 150);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod attribution;
pub mod buffs;
pub mod capability;
pub mod clock;
pub mod config;
pub mod currency;
pub mod driver;
pub mod enchant;
pub mod entry;
pub mod error;
pub mod rank;
pub mod registry;
pub mod snapshot;
pub mod store;
pub mod window;

pub use attribution::{AttributedAmounts, Channel, SourceAttribution};
pub use buffs::{AbundanceRejection, AbundanceState, AbundanceTimers, Combustion, COMBUSTION_MAX};
pub use capability::AutoUpgrades;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::LedgerConfig;
pub use currency::{Balances, Currency, CurrencyAmounts};
pub use driver::WindowDriver;
pub use enchant::{EnchantId, EnchantmentLevels};
pub use entry::{LedgerEntry, PlayerId};
pub use error::{LedgerError, LedgerResult};
pub use rank::{has_access, Permissions};
pub use registry::LedgerRegistry;
pub use snapshot::LedgerSnapshot;
pub use store::{MemorySnapshotStore, SnapshotStore, TomlSnapshotStore};
pub use window::{TimeWindow, UpgradeRecord, WindowSnapshot};
