//! # Snapshot Stores
//!
//! Where ledger snapshots live between sessions.
//!
//! ## File Format ([`TomlSnapshotStore`])
//!
//! One file per player, `<player_id>.toml`:
//!
//! ```text
//! # crc32:1a2b3c4d          <- CRC32 of everything after this line
//! lifetime_blocks_mined = 812
//! ...
//! [balances]
//! tokens = 40
//! ...
//! ```
//!
//! Writes go to `<player_id>.toml.tmp` first and are renamed into place, so
//! a crash mid-write leaves the previous snapshot intact. A checksum
//! mismatch on load is a decode error, never a silent reset.

use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::entry::PlayerId;
use crate::error::{LedgerError, LedgerResult};
use crate::snapshot::LedgerSnapshot;

/// Header prefix carrying the body checksum.
const CHECKSUM_PREFIX: &str = "# crc32:";

/// Persistence collaborator.
pub trait SnapshotStore: Send + Sync {
    /// Loads a player's snapshot, `None` if the player has never been saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be read or decoded.
    fn load(&self, id: PlayerId) -> LedgerResult<Option<LedgerSnapshot>>;

    /// Saves a player's snapshot, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be encoded or written.
    fn save(&self, id: PlayerId, snapshot: &LedgerSnapshot) -> LedgerResult<()>;
}

/// In-memory store, for tests and ephemeral servers.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<PlayerId, LedgerSnapshot>>,
}

impl MemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.lock().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.lock().is_empty()
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self, id: PlayerId) -> LedgerResult<Option<LedgerSnapshot>> {
        Ok(self.snapshots.lock().get(&id).cloned())
    }

    fn save(&self, id: PlayerId, snapshot: &LedgerSnapshot) -> LedgerResult<()> {
        self.snapshots.lock().insert(id, snapshot.clone());
        Ok(())
    }
}

/// Directory of checksummed TOML files.
#[derive(Clone, Debug)]
pub struct TomlSnapshotStore {
    dir: PathBuf,
}

impl TomlSnapshotStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Storage`] if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> LedgerResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| storage_error(&dir, &e))?;
        Ok(Self { dir })
    }

    /// Path of a player's snapshot file.
    #[must_use]
    pub fn path_for(&self, id: PlayerId) -> PathBuf {
        self.dir.join(format!("{id}.toml"))
    }

    /// Serializes a snapshot into the checksummed file format.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Encode`] if a value cannot be represented in
    /// TOML (for example a balance above `i64::MAX`).
    pub fn encode(snapshot: &LedgerSnapshot) -> LedgerResult<String> {
        let body = toml::to_string(snapshot).map_err(|e| LedgerError::Encode(e.to_string()))?;
        let checksum = crc32fast::hash(body.as_bytes());
        Ok(format!("{CHECKSUM_PREFIX}{checksum:08x}\n{body}"))
    }

    /// Parses the checksummed file format.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Decode`] on a missing or mismatched checksum,
    /// or a malformed body.
    pub fn decode(text: &str) -> LedgerResult<LedgerSnapshot> {
        let (header, body) = text
            .split_once('\n')
            .ok_or_else(|| LedgerError::Decode("missing checksum header".to_string()))?;
        let expected = header
            .trim_end()
            .strip_prefix(CHECKSUM_PREFIX)
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .ok_or_else(|| LedgerError::Decode(format!("malformed checksum header {header:?}")))?;

        let actual = crc32fast::hash(body.as_bytes());
        if actual != expected {
            return Err(LedgerError::Decode(format!(
                "checksum mismatch: header {expected:08x}, body {actual:08x}"
            )));
        }

        toml::from_str(body).map_err(|e| LedgerError::Decode(e.to_string()))
    }
}

impl SnapshotStore for TomlSnapshotStore {
    fn load(&self, id: PlayerId) -> LedgerResult<Option<LedgerSnapshot>> {
        let path = self.path_for(id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_error(&path, &e)),
        };
        Self::decode(&text).map(Some)
    }

    fn save(&self, id: PlayerId, snapshot: &LedgerSnapshot) -> LedgerResult<()> {
        let text = Self::encode(snapshot)?;
        let path = self.path_for(id);
        let tmp = path.with_extension("toml.tmp");

        let mut file = fs::File::create(&tmp).map_err(|e| storage_error(&tmp, &e))?;
        file.write_all(text.as_bytes()).map_err(|e| storage_error(&tmp, &e))?;
        file.sync_all().map_err(|e| storage_error(&tmp, &e))?;
        drop(file);

        fs::rename(&tmp, &path).map_err(|e| storage_error(&path, &e))?;
        tracing::trace!(player = id, path = %path.display(), "snapshot written");
        Ok(())
    }
}

fn storage_error(path: &Path, err: &std::io::Error) -> LedgerError {
    LedgerError::Storage {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LedgerSnapshot {
        let mut snapshot = LedgerSnapshot::default();
        snapshot.balances.coins = 1_500;
        snapshot.lifetime_credited.coins = 2_000;
        snapshot.via_resale.coins = 900;
        snapshot.permissions.insert("quarry.mine.b".to_string());
        snapshot
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySnapshotStore::new();
        assert!(store.load(1).unwrap().is_none());

        store.save(1, &sample()).unwrap();
        assert_eq!(store.load(1).unwrap(), Some(sample()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_encode_decode() {
        let text = TomlSnapshotStore::encode(&sample()).unwrap();
        assert!(text.starts_with(CHECKSUM_PREFIX));
        assert_eq!(TomlSnapshotStore::decode(&text).unwrap(), sample());
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let text = TomlSnapshotStore::encode(&sample()).unwrap();
        let tampered = text.replace("coins = 1500", "coins = 9999999");
        assert_ne!(tampered, text);

        let err = TomlSnapshotStore::decode(&tampered).unwrap_err();
        assert!(matches!(err, LedgerError::Decode(_)));
    }

    #[test]
    fn test_missing_header_is_rejected() {
        let body = toml::to_string(&sample()).unwrap();
        assert!(TomlSnapshotStore::decode(&body).is_err());
    }

    #[test]
    fn test_oversized_balance_fails_to_encode() {
        let mut snapshot = sample();
        snapshot.balances.tokens = u64::MAX;
        assert!(matches!(
            TomlSnapshotStore::encode(&snapshot),
            Err(LedgerError::Encode(_))
        ));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlSnapshotStore::open(dir.path().join("players")).unwrap();

        assert!(store.load(42).unwrap().is_none());
        store.save(42, &sample()).unwrap();
        assert_eq!(store.load(42).unwrap(), Some(sample()));
        assert!(!store.path_for(42).with_extension("toml.tmp").exists());
    }
}
