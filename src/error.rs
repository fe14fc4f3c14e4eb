// 🚨 Error Taxonomy
// Three failure families with distinct handling policies:
// - StoreError: rejected synchronously, store left untouched
// - SyncError: retried with priority downgrade, then dropped + notified
// - StorageError: prune + single retry, then logged and swallowed
//
// Derivation never errors: the pipeline resolves zero denominators and
// missing fields to 0/defaults instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("project not found: {0}")]
    NotFound(String),

    #[error("invalid project: {0}")]
    InvalidProject(String),

    #[error("failed to parse project JSON")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("dispatch rejected: {0}")]
    Dispatch(String),

    #[error("dispatch transport failed")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("storage backend error")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored value failed checksum verification: {0}")]
    Corrupt(String),

    #[error("stored value is not valid JSON: {0}")]
    Malformed(String),
}
