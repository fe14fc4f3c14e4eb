// 💾 Durable Store - string-keyed JSON blobs with quota handling
// SQLite-backed key-value store for workflow snapshots and behavior
// counters. Writes that would exceed the configured byte budget surface
// QuotaExceeded; the vault responds by pruning entries older than 7 days
// under the same key prefix and retrying exactly once, then logging and
// swallowing. Storage failures never crash the caller.

use crate::error::StorageError;
use crate::workflow::WorkflowState;
use chrono::{Duration, Utc};
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, warn};

/// Key prefix for workflow snapshots: `workflow:<id>`.
pub const WORKFLOW_PREFIX: &str = "workflow:";

/// Key prefix for behavior/session counters: `counter:<name>`.
pub const COUNTER_PREFIX: &str = "counter:";

/// Entries older than this are eligible for quota pruning.
pub const PRUNE_AGE_DAYS: i64 = 7;

// ============================================================================
// KV STORE
// ============================================================================

pub trait KvStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
    /// Delete entries under `prefix` whose last write is older than
    /// `max_age`. Returns how many were removed.
    fn prune_older_than(&self, prefix: &str, max_age: Duration) -> Result<usize, StorageError>;
}

/// SQLite-backed store. Every value carries a sha256 checksum, verified on
/// read; a mismatch surfaces `Corrupt` instead of handing back bad data.
pub struct SqliteStore {
    conn: Connection,
    /// Total value bytes allowed, None = unbounded.
    byte_budget: Option<usize>,
}

fn checksum(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P, byte_budget: Option<usize>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::setup(conn, byte_budget)
    }

    pub fn in_memory(byte_budget: Option<usize>) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::setup(conn, byte_budget)
    }

    fn setup(conn: Connection, byte_budget: Option<usize>) -> Result<Self, StorageError> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             CREATE TABLE IF NOT EXISTS kv (
                 key        TEXT PRIMARY KEY,
                 value      TEXT NOT NULL,
                 checksum   TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             );",
        )?;
        Ok(SqliteStore { conn, byte_budget })
    }

    fn stored_bytes(&self) -> Result<usize, StorageError> {
        let total: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(value)), 0) FROM kv",
            [],
            |row| row.get(0),
        )?;
        Ok(total as usize)
    }

    fn existing_len(&self, key: &str) -> Result<usize, StorageError> {
        let len: Option<i64> = self
            .conn
            .query_row(
                "SELECT LENGTH(value) FROM kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;
        Ok(len.unwrap_or(0) as usize)
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT value, checksum FROM kv WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        match row {
            None => Ok(None),
            Some((value, stored_checksum)) => {
                if checksum(&value) != stored_checksum {
                    return Err(StorageError::Corrupt(key.to_string()));
                }
                Ok(Some(value))
            }
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(budget) = self.byte_budget {
            let projected = self.stored_bytes()? - self.existing_len(key)? + value.len();
            if projected > budget {
                return Err(StorageError::QuotaExceeded);
            }
        }

        self.conn.execute(
            "INSERT INTO kv (key, value, checksum, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 checksum = excluded.checksum,
                 updated_at = excluded.updated_at",
            params![key, value, checksum(value), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv WHERE key LIKE ?1 || '%' ORDER BY key")?;
        let keys = stmt
            .query_map(params![prefix], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn prune_older_than(&self, prefix: &str, max_age: Duration) -> Result<usize, StorageError> {
        let cutoff = (Utc::now() - max_age).to_rfc3339();
        let removed = self.conn.execute(
            "DELETE FROM kv WHERE key LIKE ?1 || '%' AND updated_at < ?2",
            params![prefix, cutoff],
        )?;
        Ok(removed)
    }
}

// ============================================================================
// SNAPSHOT VAULT
// ============================================================================

/// Storage policy layer: quota-exceeded writes prune stale same-prefix
/// entries and retry exactly once; remaining failures are logged and
/// swallowed. Storage errors never crash the caller.
pub struct SnapshotVault<S: KvStore> {
    store: S,
}

impl<S: KvStore> SnapshotVault<S> {
    pub fn new(store: S) -> Self {
        SnapshotVault { store }
    }

    /// Persist a workflow snapshot under `workflow:<id>`.
    pub fn save_workflow(&self, state: &WorkflowState) {
        let key = format!("{}{}", WORKFLOW_PREFIX, state.workflow_id);
        let value = match serde_json::to_string(state) {
            Ok(v) => v,
            Err(err) => {
                warn!(%err, workflow_id = %state.workflow_id, "snapshot not serializable");
                return;
            }
        };
        self.write_with_prune(&key, &value, WORKFLOW_PREFIX);
    }

    /// Load a previously persisted workflow snapshot. Missing, corrupt or
    /// malformed snapshots resolve to None after logging.
    pub fn load_workflow(&self, workflow_id: &str) -> Option<WorkflowState> {
        let key = format!("{}{}", WORKFLOW_PREFIX, workflow_id);
        match self.store.get(&key) {
            Ok(Some(value)) => match serde_json::from_str(&value) {
                Ok(state) => Some(state),
                Err(err) => {
                    warn!(%err, key, "stored snapshot is not valid JSON");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(%err, key, "failed to read snapshot");
                None
            }
        }
    }

    /// Bump a behavior/session counter, returning the new value.
    pub fn increment_counter(&self, name: &str) -> u64 {
        let key = format!("{}{}", COUNTER_PREFIX, name);
        let current = match self.store.get(&key) {
            Ok(Some(value)) => value.parse::<u64>().unwrap_or(0),
            Ok(None) => 0,
            Err(err) => {
                warn!(%err, key, "failed to read counter");
                0
            }
        };
        let next = current + 1;
        self.write_with_prune(&key, &next.to_string(), COUNTER_PREFIX);
        next
    }

    /// Write, handling quota exhaustion by pruning entries older than
    /// `PRUNE_AGE_DAYS` under the same prefix and retrying exactly once.
    fn write_with_prune(&self, key: &str, value: &str, prefix: &str) {
        match self.store.put(key, value) {
            Ok(()) => {}
            Err(StorageError::QuotaExceeded) => {
                let pruned = self
                    .store
                    .prune_older_than(prefix, Duration::days(PRUNE_AGE_DAYS))
                    .unwrap_or_else(|err| {
                        warn!(%err, prefix, "prune failed");
                        0
                    });
                debug!(pruned, prefix, "quota exceeded, pruned stale entries");

                if let Err(err) = self.store.put(key, value) {
                    warn!(%err, key, "write failed after prune, dropping value");
                }
            }
            Err(err) => {
                warn!(%err, key, "write failed, dropping value");
            }
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

// ============================================================================
// TESTS
// ============================================================================
