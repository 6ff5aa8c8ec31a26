// Error taxonomy for the task store

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the store and its subscriptions
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Storage could not be opened, or a statement could not be committed.
    /// Terminal: once raised, the store refuses further work.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Another store instance already owns this directory
    #[error("store at {} is already open", .0.display())]
    Locked(PathBuf),

    /// The database was written by a newer schema than this build understands
    #[error("unsupported schema version {found} (expected at most {supported})")]
    UnsupportedSchema { found: i64, supported: i64 },

    /// A priority value outside {1, 2, 3}
    #[error("invalid priority: {0} (expected 1, 2 or 3)")]
    InvalidPriority(String),

    /// The store worker is gone
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// True for errors after which no read or write can be trusted
    pub fn is_terminal(&self) -> bool {
        matches!(self, StoreError::StorageUnavailable(_) | StoreError::Closed)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::StorageUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::StorageUnavailable(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
