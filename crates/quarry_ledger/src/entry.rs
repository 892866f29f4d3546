//! # Ledger Entry
//!
//! One player's ledger: balances, attribution, window, buffs, enchantments,
//! auto-upgrades and permissions, all behind a single mutex.
//!
//! ## Locking Rules
//!
//! 1. Every public method locks the entry exactly once and releases it
//!    before returning.
//! 2. No method touches another entry, so no lock-order cycles exist.
//! 3. Getters that expose sets or maps return copies, never views.
//! 4. The clock is read before the lock is taken.
//!
//! ```text
//!   Gameplay thread ──┐
//!   Window driver  ───┼──> [ Mutex<LedgerState> ] ──> one critical section per call
//!   Scoreboard     ───┘
//! ```
//!
//! ## Failure Reporting
//!
//! Expected failures (insufficient funds, malformed identifiers, buff on
//! cooldown) return `false` or a zero reading. Invariant violations are
//! bugs: they log at `error` and trip a `debug_assert!`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::attribution::{Channel, SourceAttribution};
use crate::buffs::{Abundance, AbundanceState, Combustion};
use crate::capability::AutoUpgrades;
use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::currency::{signed, Balances, Currency, CurrencyAmounts};
use crate::enchant::{EnchantId, EnchantmentLevels};
use crate::error::LedgerResult;
use crate::rank::{self, Permissions};
use crate::snapshot::LedgerSnapshot;
use crate::window::{TimeWindow, UpgradeRecord, WindowSnapshot};

/// Stable player identifier.
pub type PlayerId = u64;

/// Lifetime mining counters.
#[derive(Clone, Copy, Debug, Default)]
struct LifetimeStats {
    blocks_mined: u64,
    blocks_destroyed: u64,
}

/// All mutable state of one entry. Only ever touched under the entry lock.
struct LedgerState {
    balances: Balances,
    attribution: SourceAttribution,
    window: TimeWindow,
    combustion: Combustion,
    abundance: Abundance,
    enchantments: EnchantmentLevels,
    auto_upgrades: AutoUpgrades,
    permissions: Permissions,
    lifetime: LifetimeStats,
    /// True once the entry reflects stored state: built from a snapshot,
    /// merged with one, or written out by the registry.
    restored: bool,
}

impl LedgerState {
    fn new(config: &LedgerConfig) -> Self {
        Self {
            balances: Balances::new(),
            attribution: SourceAttribution::new(),
            window: TimeWindow::new(config.max_upgrade_records),
            combustion: Combustion::default(),
            abundance: Abundance::new(),
            enchantments: EnchantmentLevels::new(),
            auto_upgrades: AutoUpgrades::new(),
            permissions: Permissions::new(),
            lifetime: LifetimeStats::default(),
            restored: false,
        }
    }

    fn restore(config: &LedgerConfig, snapshot: &LedgerSnapshot) -> Self {
        Self {
            balances: Balances::from_parts(snapshot.balances, snapshot.lifetime_credited),
            attribution: SourceAttribution::from_parts(snapshot.via_primary, snapshot.via_resale),
            window: TimeWindow::new(config.max_upgrade_records),
            combustion: Combustion::new(snapshot.combustion),
            abundance: Abundance::from_timers(snapshot.abundance),
            enchantments: EnchantmentLevels::from_map(snapshot.enchantments.clone()),
            auto_upgrades: AutoUpgrades::from_set(snapshot.auto_upgrades.clone()),
            permissions: Permissions::from_set(snapshot.permissions.clone()),
            lifetime: LifetimeStats {
                blocks_mined: snapshot.lifetime_blocks_mined,
                blocks_destroyed: snapshot.lifetime_blocks_destroyed,
            },
            restored: true,
        }
    }

    fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            lifetime_blocks_mined: self.lifetime.blocks_mined,
            lifetime_blocks_destroyed: self.lifetime.blocks_destroyed,
            combustion: self.combustion.level(),
            auto_upgrades: self.auto_upgrades.to_set(),
            permissions: self.permissions.to_set(),
            balances: self.balances.amounts(),
            lifetime_credited: self.balances.lifetime_amounts(),
            via_primary: self.attribution.channel(Channel::Primary),
            via_resale: self.attribution.channel(Channel::Resale),
            abundance: self.abundance.timers(),
            enchantments: self.enchantments.to_map(),
        }
    }

    /// Settles abundance, logging an expiry that happened since the last call.
    fn settle_abundance(&mut self, player: PlayerId, now: u64) -> AbundanceState {
        let was_running = self.abundance.timers().active_until.is_some();
        let settled = self.abundance.settle(now);
        if was_running && !matches!(settled, AbundanceState::Active { .. }) {
            tracing::debug!(player, ?settled, "abundance expired");
        }
        settled
    }

    fn verify(&self, player: PlayerId) {
        let audit = self.attribution.audit(&self.balances);
        if let Err(err) = &audit {
            tracing::error!(player, %err, "ledger invariant violated");
        }
        debug_assert!(audit.is_ok(), "ledger invariant violated for player {player}: {audit:?}");
    }
}

/// Thread-safe ledger for one player.
///
/// Shared as `Arc<LedgerEntry>` by the [`crate::registry::LedgerRegistry`].
pub struct LedgerEntry {
    id: PlayerId,
    config: Arc<LedgerConfig>,
    clock: Arc<dyn Clock>,
    state: Mutex<LedgerState>,
}

impl fmt::Debug for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerEntry")
            .field("id", &self.id)
            .field("balances", &self.state.try_lock().map(|state| state.balances.amounts()))
            .finish_non_exhaustive()
    }
}

impl LedgerEntry {
    /// Creates a zeroed entry.
    #[must_use]
    pub fn new(id: PlayerId, config: Arc<LedgerConfig>, clock: Arc<dyn Clock>) -> Self {
        let state = LedgerState::new(&config);
        Self {
            id,
            config,
            clock,
            state: Mutex::new(state),
        }
    }

    /// Rebuilds an entry from a snapshot.
    ///
    /// Malformed permission strings are dropped; zero enchantment levels are
    /// dropped; combustion is clamped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LedgerError::AttributionOverflow`] if the snapshot's
    /// attribution exceeds its lifetime credits.
    pub fn from_snapshot(
        id: PlayerId,
        snapshot: &LedgerSnapshot,
        config: Arc<LedgerConfig>,
        clock: Arc<dyn Clock>,
    ) -> LedgerResult<Self> {
        let state = LedgerState::restore(&config, snapshot);
        if let Err(err) = state.attribution.audit(&state.balances) {
            tracing::error!(player = id, %err, "refusing to load inconsistent snapshot");
            return Err(err);
        }

        Ok(Self {
            id,
            config,
            clock,
            state: Mutex::new(state),
        })
    }

    /// Captures the persistent state.
    #[must_use]
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.state.lock().snapshot()
    }

    /// Captures the persistent state for writing to a store.
    ///
    /// From here on the entry counts as reflecting stored state, so a later
    /// load of the same player does not fold the written file back in.
    pub(crate) fn snapshot_for_save(&self) -> LedgerSnapshot {
        let mut state = self.state.lock();
        state.restored = true;
        state.snapshot()
    }

    /// Returns true if the entry reflects stored state.
    pub(crate) fn is_restored(&self) -> bool {
        self.state.lock().restored
    }

    /// Marks an entry as authoritative when the store holds nothing for it.
    pub(crate) fn mark_restored(&self) {
        self.state.lock().restored = true;
    }

    /// Folds a stored snapshot into an entry that went live before the
    /// snapshot was loaded.
    ///
    /// See [`LedgerSnapshot::merged_with`] for how values combine. The live
    /// window is kept. Returns false and changes nothing if the entry already
    /// reflects stored state.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LedgerError::AttributionOverflow`] if the merged state
    /// fails its audit; the entry is left unchanged.
    pub(crate) fn absorb_snapshot(&self, snapshot: &LedgerSnapshot) -> LedgerResult<bool> {
        let mut state = self.state.lock();
        if state.restored {
            return Ok(false);
        }

        let merged = snapshot.merged_with(&state.snapshot());
        let mut next = LedgerState::restore(&self.config, &merged);
        if let Err(err) = next.attribution.audit(&next.balances) {
            tracing::error!(player = self.id, %err, "refusing to merge inconsistent snapshot");
            return Err(err);
        }

        std::mem::swap(&mut next.window, &mut state.window);
        *state = next;
        Ok(true)
    }

    /// Returns the player this entry belongs to.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> PlayerId {
        self.id
    }

    // ========================================================================
    // Balances
    // ========================================================================

    /// Returns one balance.
    #[must_use]
    pub fn balance(&self, currency: Currency) -> u64 {
        self.state.lock().balances.get(currency)
    }

    /// Returns every balance, read under one lock.
    #[must_use]
    pub fn balances(&self) -> CurrencyAmounts<u64> {
        self.state.lock().balances.amounts()
    }

    /// Returns the lifetime credits of a currency.
    #[must_use]
    pub fn lifetime_credited(&self, currency: Currency) -> u64 {
        self.state.lock().balances.lifetime_credited(currency)
    }

    /// Credits a balance. Returns the new balance.
    pub fn credit(&self, currency: Currency, amount: u64) -> u64 {
        let mut state = self.state.lock();
        let applied = state.balances.credit(currency, amount);
        state.window.add_currency(currency, signed(applied));
        tracing::trace!(player = self.id, %currency, amount = applied, "credit");
        state.balances.get(currency)
    }

    /// Credits a balance and attributes the credit to `channel`.
    ///
    /// Beacons are not attributable; for them this is a plain credit.
    /// Returns the new balance.
    pub fn credit_via(&self, channel: Channel, currency: Currency, amount: u64) -> u64 {
        let mut state = self.state.lock();
        let applied = state.balances.credit(currency, amount);
        state.window.add_currency(currency, signed(applied));
        if state.attribution.record(channel, currency, applied) {
            state.window.add_attributed(channel, currency, applied);
        }
        state.verify(self.id);
        tracing::trace!(player = self.id, %currency, ?channel, amount = applied, "attributed credit");
        state.balances.get(currency)
    }

    /// Credits a balance through the primary tool. Returns the new balance.
    pub fn credit_via_primary(&self, currency: Currency, amount: u64) -> u64 {
        self.credit_via(Channel::Primary, currency, amount)
    }

    /// Debits a balance if it covers `amount`.
    ///
    /// Returns false and changes nothing otherwise. Attribution is never
    /// reduced by a debit.
    pub fn debit(&self, currency: Currency, amount: u64) -> bool {
        let mut state = self.state.lock();
        if !state.balances.debit(currency, amount) {
            let balance = state.balances.get(currency);
            drop(state);
            tracing::debug!(player = self.id, %currency, amount, balance, "debit refused: insufficient balance");
            return false;
        }
        state.window.add_currency(currency, -signed(amount));
        tracing::trace!(player = self.id, %currency, amount, "debit");
        true
    }

    /// Applies a signed admin adjustment, clamping at zero.
    ///
    /// Returns the new balance.
    pub fn adjust(&self, currency: Currency, delta: i64) -> u64 {
        let mut state = self.state.lock();
        let applied = state.balances.adjust(currency, delta);
        state.window.add_currency(currency, applied);
        tracing::debug!(player = self.id, %currency, requested = delta, applied, "balance adjusted");
        state.balances.get(currency)
    }

    /// Overwrites a balance, clamping negatives to zero.
    ///
    /// Load path only: neither the window nor lifetime credits move.
    pub fn set_absolute(&self, currency: Currency, value: i64) {
        self.state.lock().balances.set_absolute(currency, value);
    }

    /// Returns the attributed credits of a channel and currency.
    #[must_use]
    pub fn attributed(&self, channel: Channel, currency: Currency) -> u64 {
        self.state.lock().attribution.get(channel, currency)
    }

    /// Checks the attribution invariant.
    ///
    /// # Errors
    ///
    /// Returns [`crate::LedgerError::AttributionOverflow`] when violated.
    pub fn audit(&self) -> LedgerResult<()> {
        let state = self.state.lock();
        state.attribution.audit(&state.balances)
    }

    // ========================================================================
    // Enchantments
    // ========================================================================

    /// Returns an enchantment level. Unknown or malformed ids read as 0.
    #[must_use]
    pub fn enchantment_level(&self, id: &str) -> u32 {
        let Some(id) = EnchantId::parse(id) else {
            return 0;
        };
        self.state.lock().enchantments.get(&id)
    }

    /// Sets an enchantment level. Returns false for a malformed id.
    pub fn set_enchantment_level(&self, id: &str, level: u32) -> bool {
        let Some(id) = EnchantId::parse(id) else {
            tracing::debug!(player = self.id, id, "ignoring malformed enchantment id");
            return false;
        };
        self.state.lock().enchantments.set(id, level);
        true
    }

    /// Returns a copy of every non-zero enchantment level.
    #[must_use]
    pub fn enchantment_levels(&self) -> BTreeMap<EnchantId, u32> {
        self.state.lock().enchantments.to_map()
    }

    // ========================================================================
    // Mining Events
    // ========================================================================

    /// Counts one mined block of `material`.
    pub fn record_block_mined(&self, material: &str) {
        let mut state = self.state.lock();
        state.window.record_block_mined(material);
        state.lifetime.blocks_mined = state.lifetime.blocks_mined.saturating_add(1);
        state.lifetime.blocks_destroyed = state.lifetime.blocks_destroyed.saturating_add(1);
    }

    /// Counts blocks destroyed by explosions and other area effects.
    pub fn record_blocks_destroyed(&self, count: u64) {
        let mut state = self.state.lock();
        state.window.record_blocks_destroyed(count);
        state.lifetime.blocks_destroyed = state.lifetime.blocks_destroyed.saturating_add(count);
    }

    /// Counts one greed proc.
    pub fn record_greed_trigger(&self) {
        self.state.lock().window.record_greed_trigger();
    }

    /// Counts obtained crate keys.
    pub fn record_keys_obtained(&self, count: u64) {
        self.state.lock().window.record_keys_obtained(count);
    }

    /// Lifetime mined blocks.
    #[must_use]
    pub fn lifetime_blocks_mined(&self) -> u64 {
        self.state.lock().lifetime.blocks_mined
    }

    /// Lifetime destroyed blocks.
    #[must_use]
    pub fn lifetime_blocks_destroyed(&self) -> u64 {
        self.state.lock().lifetime.blocks_destroyed
    }

    // ========================================================================
    // Time Window
    // ========================================================================

    /// Returns a copy of the current window.
    #[must_use]
    pub fn window(&self) -> WindowSnapshot {
        self.state.lock().window.current().clone()
    }

    /// Clears the window. Called by the periodic driver.
    pub fn reset_window(&self) {
        self.state.lock().window.reset();
        tracing::trace!(player = self.id, "window reset");
    }

    /// Clears the window and returns what it held.
    pub fn take_window(&self) -> WindowSnapshot {
        self.state.lock().window.take()
    }

    /// Net change of a currency in the current window.
    #[must_use]
    pub fn window_currency(&self, currency: Currency) -> i64 {
        self.state.lock().window.current().currency.get(currency)
    }

    /// Attributed credits of a channel in the current window.
    #[must_use]
    pub fn window_attributed(&self, channel: Channel, currency: Currency) -> u64 {
        self.state.lock().window.current().attributed(channel).get(currency)
    }

    /// Blocks mined in the current window.
    #[must_use]
    pub fn window_blocks_mined(&self) -> u64 {
        self.state.lock().window.current().blocks_mined
    }

    /// Blocks destroyed in the current window.
    #[must_use]
    pub fn window_blocks_destroyed(&self) -> u64 {
        self.state.lock().window.current().blocks_destroyed
    }

    /// Greed procs in the current window.
    #[must_use]
    pub fn window_greed_triggers(&self) -> u64 {
        self.state.lock().window.current().greed_triggers
    }

    /// Keys obtained in the current window.
    #[must_use]
    pub fn window_keys_obtained(&self) -> u64 {
        self.state.lock().window.current().keys_obtained
    }

    /// Auto-upgrade levels gained in the current window.
    #[must_use]
    pub fn window_upgrade_levels(&self) -> u64 {
        self.state.lock().window.current().upgrade_levels
    }

    /// Copy of the current window's upgrade log.
    #[must_use]
    pub fn window_upgrades(&self) -> Vec<UpgradeRecord> {
        self.state.lock().window.current().upgrades.clone()
    }

    // ========================================================================
    // Buffs
    // ========================================================================

    /// Activates abundance for `duration_ms`.
    ///
    /// Returns false if it is already active, cooling down, or the duration
    /// is zero.
    pub fn activate_abundance(&self, duration_ms: u64) -> bool {
        let now = self.clock.now_ms();
        let cooldown_ms = self.config.abundance_cooldown_ms;
        let outcome = {
            let mut state = self.state.lock();
            state.settle_abundance(self.id, now);
            state.abundance.activate(now, duration_ms, cooldown_ms)
        };
        match outcome {
            Ok(ends_at) => {
                tracing::debug!(player = self.id, ends_at, "abundance activated");
                true
            }
            Err(reason) => {
                tracing::debug!(player = self.id, ?reason, "abundance activation refused");
                false
            }
        }
    }

    /// Returns true if abundance is running.
    #[must_use]
    pub fn is_abundance_active(&self) -> bool {
        let now = self.clock.now_ms();
        matches!(self.state.lock().settle_abundance(self.id, now), AbundanceState::Active { .. })
    }

    /// Returns true if abundance is not running and its cooldown is pending.
    #[must_use]
    pub fn is_abundance_on_cooldown(&self) -> bool {
        let now = self.clock.now_ms();
        matches!(self.state.lock().settle_abundance(self.id, now), AbundanceState::Cooldown { .. })
    }

    /// Whole seconds until abundance can be activated again.
    #[must_use]
    pub fn abundance_cooldown_remaining_secs(&self) -> u64 {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        state.settle_abundance(self.id, now);
        state.abundance.remaining_cooldown_secs(now)
    }

    /// Milliseconds of abundance left, 0 if not running.
    #[must_use]
    pub fn abundance_remaining_ms(&self) -> u64 {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        state.settle_abundance(self.id, now);
        state.abundance.remaining_active_ms(now)
    }

    /// Settled abundance state.
    #[must_use]
    pub fn abundance_state(&self) -> AbundanceState {
        let now = self.clock.now_ms();
        self.state.lock().settle_abundance(self.id, now)
    }

    /// Ends abundance without a cooldown. Returns true if it was running.
    pub fn force_deactivate_abundance(&self) -> bool {
        let now = self.clock.now_ms();
        let was_active = {
            let mut state = self.state.lock();
            state.settle_abundance(self.id, now);
            state.abundance.force_deactivate(now)
        };
        if was_active {
            tracing::debug!(player = self.id, "abundance force-deactivated");
        }
        was_active
    }

    /// Raises combustion. Returns the new level.
    pub fn increase_combustion(&self, amount: u32) -> u32 {
        self.state.lock().combustion.increase(amount)
    }

    /// Overwrites combustion, e.g. from a decay task.
    pub fn set_combustion(&self, level: u32) {
        self.state.lock().combustion.set(level);
    }

    /// Current combustion level.
    #[must_use]
    pub fn combustion_level(&self) -> u32 {
        self.state.lock().combustion.level()
    }

    /// Current combustion multiplier, `1 + level / 1000`.
    #[must_use]
    pub fn combustion_multiplier(&self) -> f64 {
        self.state.lock().combustion.multiplier()
    }

    // ========================================================================
    // Auto-Upgrade
    // ========================================================================

    /// Enables auto-upgrade. Returns true if newly enabled.
    pub fn enable_auto_upgrade(&self, id: &str) -> bool {
        EnchantId::parse(id).is_some_and(|id| self.state.lock().auto_upgrades.enable(id))
    }

    /// Disables auto-upgrade. Returns true if it was enabled.
    pub fn disable_auto_upgrade(&self, id: &str) -> bool {
        EnchantId::parse(id).is_some_and(|id| self.state.lock().auto_upgrades.disable(&id))
    }

    /// Returns true if auto-upgrade is enabled.
    #[must_use]
    pub fn is_auto_upgrade_enabled(&self, id: &str) -> bool {
        EnchantId::parse(id).is_some_and(|id| self.state.lock().auto_upgrades.is_enabled(&id))
    }

    /// Returns a copy of the enabled set.
    #[must_use]
    pub fn auto_upgrades(&self) -> BTreeSet<EnchantId> {
        self.state.lock().auto_upgrades.to_set()
    }

    /// Logs an automatic upgrade into the current window.
    ///
    /// Returns false for a malformed id.
    pub fn record_upgrade_event(&self, id: &str, levels_gained: u32, new_level: u32) -> bool {
        let Some(enchant) = EnchantId::parse(id) else {
            tracing::debug!(player = self.id, id, "ignoring upgrade for malformed enchantment id");
            return false;
        };
        self.state.lock().window.record_upgrade(UpgradeRecord {
            enchant,
            levels_gained,
            new_level,
        });
        true
    }

    // ========================================================================
    // Permissions & Rank
    // ========================================================================

    /// Grants a permission. Returns true if newly granted.
    pub fn grant_permission(&self, permission: &str) -> bool {
        self.state.lock().permissions.grant(permission)
    }

    /// Revokes a permission. Returns true if it was held.
    pub fn revoke_permission(&self, permission: &str) -> bool {
        self.state.lock().permissions.revoke(permission)
    }

    /// Returns true if the permission is held.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.state.lock().permissions.contains(permission)
    }

    /// Returns a copy of every held permission.
    #[must_use]
    pub fn permissions(&self) -> BTreeSet<String> {
        self.state.lock().permissions.to_set()
    }

    /// Highest mine rank letter, `None` if no rank permission is held.
    #[must_use]
    pub fn highest_rank(&self) -> Option<char> {
        self.state
            .lock()
            .permissions
            .highest_rank(&self.config.rank_permission_prefix)
    }

    /// Returns true if the player may access mine rank `target`.
    #[must_use]
    pub fn has_access(&self, target: char) -> bool {
        rank::has_access(self.highest_rank(), target)
    }
}
