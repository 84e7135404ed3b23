//! Storage-layer error type, grounded in the teacher's `storage/error.rs`
//! shape (a dedicated `thiserror` enum distinct from the crate-level
//! taxonomy, `#[from]`-wired to the backing engine's own error type).

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed at version {version}: {message}")]
    Migration { version: i64, message: String },

    #[error("integrity check failed: {0}")]
    IntegrityCheck(String),

    #[error("connection pool exhausted")]
    PoolExhausted,

    #[error("write lock poisoned")]
    LockPoisoned,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
