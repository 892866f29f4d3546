//! # Ledger Registry
//!
//! **THE VAULT** - one ledger per online player, nothing else.
//!
//! The registry owns every live [`LedgerEntry`] behind an `Arc`. Callers get
//! shared handles and call entry methods from any thread.
//!
//! ## Lifecycle
//!
//! ```text
//!   join ──> load_from(store) ──> Arc<LedgerEntry> handed to gameplay
//!                                        │
//!              every 60s ──> take_all_windows() / reset_all_windows()
//!                                        │
//!   quit ──> unload_into(store) ──> snapshot saved, entry evicted
//! ```
//!
//! Entries are never dropped implicitly. Eviction happens only through
//! [`LedgerRegistry::evict`] or [`LedgerRegistry::unload_into`].
//!
//! Gameplay may reach a player through [`LedgerRegistry::get_or_create`]
//! before the join handler has loaded them. A snapshot that arrives after
//! that is folded into the live entry, never discarded.
//!
//! ## Locking
//!
//! The map lock is held only to look up, insert or remove an `Arc`. It is
//! never held while an entry lock is taken.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::clock::{Clock, SystemClock};
use crate::config::LedgerConfig;
use crate::entry::{LedgerEntry, PlayerId};
use crate::error::LedgerResult;
use crate::snapshot::LedgerSnapshot;
use crate::store::SnapshotStore;
use crate::window::WindowSnapshot;

/// Concurrent map from player to ledger entry.
pub struct LedgerRegistry {
    /// Live entries.
    entries: RwLock<HashMap<PlayerId, Arc<LedgerEntry>>>,
    /// Shared configuration.
    config: Arc<LedgerConfig>,
    /// Time source handed to every entry.
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for LedgerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerRegistry")
            .field("entries", &self.entries.read().len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LedgerRegistry {
    /// Creates an empty registry on the system clock.
    #[must_use]
    pub fn new(config: LedgerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates an empty registry on a custom clock.
    #[must_use]
    pub fn with_clock(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config: Arc::new(config),
            clock,
        }
    }

    /// Shared configuration.
    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Returns the entry for `id`, creating a zeroed one on first access.
    pub fn get_or_create(&self, id: PlayerId) -> Arc<LedgerEntry> {
        if let Some(entry) = self.entries.read().get(&id) {
            return Arc::clone(entry);
        }

        let mut entries = self.entries.write();
        let entry = entries.entry(id).or_insert_with(|| {
            tracing::info!(player = id, "ledger entry created");
            Arc::new(LedgerEntry::new(id, Arc::clone(&self.config), Arc::clone(&self.clock)))
        });
        Arc::clone(entry)
    }

    /// Returns the entry for `id` if it is live.
    #[must_use]
    pub fn get(&self, id: PlayerId) -> Option<Arc<LedgerEntry>> {
        self.entries.read().get(&id).cloned()
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if no entry is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Ids of every live entry.
    #[must_use]
    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.entries.read().keys().copied().collect()
    }

    fn handles(&self) -> Vec<Arc<LedgerEntry>> {
        self.entries.read().values().cloned().collect()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Builds an entry from a snapshot and registers it.
    ///
    /// If gameplay already created the player's entry before the snapshot
    /// arrived, the snapshot is folded into that live entry instead of being
    /// dropped. An entry that already reflects stored state is returned as is.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot fails its invariant audit.
    pub fn insert_loaded(&self, id: PlayerId, snapshot: &LedgerSnapshot) -> LedgerResult<Arc<LedgerEntry>> {
        let loaded = Arc::new(LedgerEntry::from_snapshot(
            id,
            snapshot,
            Arc::clone(&self.config),
            Arc::clone(&self.clock),
        )?);

        let live = match self.entries.write().entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&loaded));
                tracing::info!(player = id, "ledger entry loaded");
                return Ok(loaded);
            }
            Entry::Occupied(slot) => Arc::clone(slot.get()),
        };

        if live.absorb_snapshot(snapshot)? {
            tracing::warn!(player = id, "entry went live before its snapshot loaded, merged snapshot into it");
        }
        Ok(live)
    }

    /// Loads a player from `store`, or creates a fresh entry if none is saved.
    ///
    /// # Errors
    ///
    /// Propagates store and snapshot errors. A failed load leaves any live
    /// entry untouched.
    pub fn load_from(&self, store: &dyn SnapshotStore, id: PlayerId) -> LedgerResult<Arc<LedgerEntry>> {
        if let Some(entry) = self.get(id) {
            if entry.is_restored() {
                return Ok(entry);
            }
        }

        match store.load(id)? {
            Some(snapshot) => self.insert_loaded(id, &snapshot),
            None => {
                let entry = self.get_or_create(id);
                entry.mark_restored();
                Ok(entry)
            }
        }
    }

    /// Removes an entry and returns its final snapshot.
    ///
    /// Handles still held elsewhere keep working but are no longer tracked.
    pub fn evict(&self, id: PlayerId) -> Option<LedgerSnapshot> {
        let entry = self.entries.write().remove(&id)?;
        tracing::info!(player = id, "ledger entry evicted");
        Some(entry.snapshot())
    }

    /// Saves an entry's snapshot to `store`, then evicts it.
    ///
    /// The entry stays registered until its snapshot is written, so a failed
    /// save leaves it live and a concurrent load sees the live entry rather
    /// than an older file. Writes that land between the save and the eviction
    /// are flushed with a second save.
    ///
    /// Returns false if the player was not live, or if its entry was replaced
    /// while the save was in flight (the replacement stays live).
    ///
    /// # Errors
    ///
    /// Propagates the store error.
    pub fn unload_into(&self, store: &dyn SnapshotStore, id: PlayerId) -> LedgerResult<bool> {
        let Some(entry) = self.get(id) else {
            return Ok(false);
        };

        let saved = entry.snapshot_for_save();
        if let Err(err) = store.save(id, &saved) {
            tracing::error!(player = id, %err, "failed to flush ledger, keeping entry live");
            return Err(err);
        }

        {
            let mut entries = self.entries.write();
            if !entries.get(&id).is_some_and(|current| Arc::ptr_eq(current, &entry)) {
                tracing::warn!(player = id, "ledger entry replaced during unload, leaving replacement live");
                return Ok(false);
            }
            entries.remove(&id);
        }

        let last = entry.snapshot();
        if last != saved {
            if let Err(err) = store.save(id, &last) {
                tracing::error!(player = id, %err, "failed to flush late writes, reinstating entry");
                self.reinstate(id, entry, &last);
                return Err(err);
            }
        }

        tracing::info!(player = id, "ledger entry flushed and evicted");
        Ok(true)
    }

    /// Puts an evicted entry back. If a fresh entry took its slot meanwhile,
    /// the evicted state is folded into it.
    fn reinstate(&self, id: PlayerId, entry: Arc<LedgerEntry>, last: &LedgerSnapshot) {
        let occupant = match self.entries.write().entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(entry);
                return;
            }
            Entry::Occupied(slot) => Arc::clone(slot.get()),
        };

        match occupant.absorb_snapshot(last) {
            Ok(true) => {}
            Ok(false) => tracing::error!(player = id, "late writes lost: replacement entry already holds stored state"),
            Err(err) => tracing::error!(player = id, %err, "late writes lost: merge refused"),
        }
    }

    /// Saves every live entry without evicting. Returns how many were saved.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first store error.
    pub fn save_all(&self, store: &dyn SnapshotStore) -> LedgerResult<usize> {
        let handles = self.handles();
        for entry in &handles {
            store.save(entry.id(), &entry.snapshot_for_save())?;
        }
        Ok(handles.len())
    }

    // ========================================================================
    // Window Driver API
    // ========================================================================

    /// Resets the window of every live entry.
    ///
    /// Entries are reset one at a time; no two entry locks are held together.
    pub fn reset_all_windows(&self) {
        let handles = self.handles();
        for entry in &handles {
            entry.reset_window();
        }
        tracing::debug!(entries = handles.len(), "windows reset");
    }

    /// Takes the window of every live entry.
    pub fn take_all_windows(&self) -> Vec<(PlayerId, WindowSnapshot)> {
        self.handles()
            .into_iter()
            .map(|entry| (entry.id(), entry.take_window()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;
    use crate::error::LedgerError;
    use crate::store::MemorySnapshotStore;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FailingStore;

    impl SnapshotStore for FailingStore {
        fn load(&self, _id: PlayerId) -> LedgerResult<Option<LedgerSnapshot>> {
            Ok(None)
        }

        fn save(&self, id: PlayerId, _snapshot: &LedgerSnapshot) -> LedgerResult<()> {
            Err(LedgerError::Storage {
                path: id.to_string(),
                reason: "disk full".to_string(),
            })
        }
    }

    #[derive(Clone, Copy)]
    enum Hook {
        MineDuringLoad,
        MineDuringFailedSave,
        ReloadDuringSave,
    }

    /// Store that calls back into the registry from inside `load`/`save`,
    /// the way a host's async join/quit handlers interleave with gameplay.
    struct ReentrantStore {
        registry: Arc<LedgerRegistry>,
        inner: MemorySnapshotStore,
        hook: Hook,
        fired: AtomicBool,
    }

    impl ReentrantStore {
        fn new(registry: &Arc<LedgerRegistry>, hook: Hook) -> Self {
            Self {
                registry: Arc::clone(registry),
                inner: MemorySnapshotStore::new(),
                hook,
                fired: AtomicBool::new(false),
            }
        }

        fn first_call(&self) -> bool {
            !self.fired.swap(true, Ordering::SeqCst)
        }
    }

    impl SnapshotStore for ReentrantStore {
        fn load(&self, id: PlayerId) -> LedgerResult<Option<LedgerSnapshot>> {
            if matches!(self.hook, Hook::MineDuringLoad) && self.first_call() {
                self.registry.get_or_create(id).record_block_mined("stone");
            }
            self.inner.load(id)
        }

        fn save(&self, id: PlayerId, snapshot: &LedgerSnapshot) -> LedgerResult<()> {
            match self.hook {
                Hook::MineDuringFailedSave => {
                    self.registry.get_or_create(id).record_block_mined("stone");
                    Err(LedgerError::Storage {
                        path: id.to_string(),
                        reason: "disk full".to_string(),
                    })
                }
                Hook::ReloadDuringSave if self.first_call() => {
                    self.registry.load_from(&self.inner, id)?.credit(Currency::Coins, 1);
                    self.inner.save(id, snapshot)
                }
                _ => self.inner.save(id, snapshot),
            }
        }
    }

    fn stored_tokens(amount: u64) -> LedgerSnapshot {
        let mut snapshot = LedgerSnapshot::default();
        snapshot.balances.tokens = amount;
        snapshot.lifetime_credited.tokens = amount;
        snapshot.via_primary.tokens = amount;
        snapshot
    }

    #[test]
    fn test_load_keeps_snapshot_when_gameplay_touched_player_first() {
        let registry = Arc::new(LedgerRegistry::new(LedgerConfig::default()));
        let store = ReentrantStore::new(&registry, Hook::MineDuringLoad);
        store.inner.save(1, &stored_tokens(500)).unwrap();

        let entry = registry.load_from(&store, 1).unwrap();
        assert!(Arc::ptr_eq(&entry, &registry.get(1).unwrap()));
        assert_eq!(entry.balance(Currency::Tokens), 500);
        assert_eq!(entry.attributed(crate::Channel::Primary, Currency::Tokens), 500);
        assert_eq!(entry.lifetime_blocks_mined(), 1);

        // Loading again must not fold the same file in twice.
        let again = registry.load_from(&store, 1).unwrap();
        assert_eq!(again.balance(Currency::Tokens), 500);

        assert!(registry.unload_into(&store, 1).unwrap());
        assert_eq!(store.inner.load(1).unwrap().unwrap().balances.tokens, 500);
    }

    #[test]
    fn test_lazy_entry_absorbs_snapshot_on_join() {
        let store = MemorySnapshotStore::new();
        store.save(3, &stored_tokens(80)).unwrap();

        let registry = LedgerRegistry::new(LedgerConfig::default());
        registry.get_or_create(3).credit(Currency::Tokens, 20);

        let entry = registry.load_from(&store, 3).unwrap();
        assert_eq!(entry.balance(Currency::Tokens), 100);
        assert_eq!(entry.lifetime_credited(Currency::Tokens), 100);
        assert_eq!(entry.window_currency(Currency::Tokens), 20);
    }

    #[test]
    fn test_failed_unload_is_not_shadowed_by_new_entry() {
        let registry = Arc::new(LedgerRegistry::new(LedgerConfig::default()));
        let store = ReentrantStore::new(&registry, Hook::MineDuringFailedSave);
        let entry = registry.get_or_create(2);
        entry.credit(Currency::Coins, 900);

        assert!(registry.unload_into(&store, 2).is_err());

        let live = registry.get(2).unwrap();
        assert!(Arc::ptr_eq(&live, &entry));
        assert_eq!(live.balance(Currency::Coins), 900);
        assert_eq!(live.lifetime_blocks_mined(), 1);
    }

    #[test]
    fn test_load_during_unload_sees_live_entry() {
        let registry = Arc::new(LedgerRegistry::new(LedgerConfig::default()));
        let store = ReentrantStore::new(&registry, Hook::ReloadDuringSave);
        let mut old = LedgerSnapshot::default();
        old.balances.coins = 100;
        old.lifetime_credited.coins = 100;
        store.inner.save(6, &old).unwrap();

        let entry = registry.load_from(&store.inner, 6).unwrap();
        entry.credit(Currency::Coins, 800);

        // The reload inside `save` lands on the live entry, not the old file,
        // and its late credit is flushed before eviction completes.
        assert!(registry.unload_into(&store, 6).unwrap());
        assert!(registry.get(6).is_none());
        assert_eq!(store.inner.load(6).unwrap().unwrap().balances.coins, 901);
    }

    #[test]
    fn test_get_or_create_returns_same_entry() {
        let registry = LedgerRegistry::new(LedgerConfig::default());
        let a = registry.get_or_create(1);
        let b = registry.get_or_create(1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(2).is_none());
    }

    #[test]
    fn test_evict_returns_final_snapshot() {
        let registry = LedgerRegistry::new(LedgerConfig::default());
        registry.get_or_create(3).credit(Currency::Coins, 77);

        let snapshot = registry.evict(3).unwrap();
        assert_eq!(snapshot.balances.coins, 77);
        assert!(registry.is_empty());
        assert!(registry.evict(3).is_none());
    }

    #[test]
    fn test_load_and_unload_through_store() {
        let store = MemorySnapshotStore::new();
        let registry = LedgerRegistry::new(LedgerConfig::default());

        let entry = registry.load_from(&store, 9).unwrap();
        entry.credit_via_primary(Currency::Tokens, 15);
        drop(entry);

        assert!(registry.unload_into(&store, 9).unwrap());
        assert!(registry.get(9).is_none());
        assert!(!registry.unload_into(&store, 9).unwrap());

        let reloaded = registry.load_from(&store, 9).unwrap();
        assert_eq!(reloaded.balance(Currency::Tokens), 15);
        assert_eq!(reloaded.attributed(crate::Channel::Primary, Currency::Tokens), 15);
    }

    #[test]
    fn test_failed_flush_keeps_entry() {
        let registry = LedgerRegistry::new(LedgerConfig::default());
        registry.get_or_create(4).credit(Currency::Beacons, 2);

        assert!(registry.unload_into(&FailingStore, 4).is_err());
        assert_eq!(registry.get(4).unwrap().balance(Currency::Beacons), 2);
    }

    #[test]
    fn test_window_driver_api() {
        let registry = LedgerRegistry::new(LedgerConfig::default());
        registry.get_or_create(1).record_block_mined("stone");
        registry.get_or_create(2).credit(Currency::Coins, 5);

        let mut taken = registry.take_all_windows();
        taken.sort_by_key(|(id, _)| *id);
        assert_eq!(taken.len(), 2);
        assert_eq!(taken[0].1.blocks_mined, 1);
        assert_eq!(taken[1].1.currency.coins, 5);

        registry.get_or_create(1).record_greed_trigger();
        registry.reset_all_windows();
        assert!(registry.get(1).unwrap().window().is_empty());
    }

    #[test]
    fn test_save_all() {
        let store = MemorySnapshotStore::new();
        let registry = LedgerRegistry::new(LedgerConfig::default());
        registry.get_or_create(1);
        registry.get_or_create(2);

        assert_eq!(registry.save_all(&store).unwrap(), 2);
        assert_eq!(store.len(), 2);
        assert_eq!(registry.len(), 2);
    }
}
