//! Error taxonomy for the indexing engine (spec §7).
//!
//! Variant names track the spec's kind names one-for-one so that the MCP
//! and CLI surfaces can report `{error: kind, message}` without a second
//! translation table.

use std::path::PathBuf;
use thiserror::Error;

pub type IndexResult<T> = Result<T, IndexError>;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid project path `{path}`: {reason}")]
    InvalidProjectPath { path: PathBuf, reason: String },

    #[error("parser library unavailable: {0}")]
    ParserUnavailable(String),

    #[error("cache schema version {on_disk} is newer than supported version {supported}")]
    SchemaTooNew { on_disk: i64, supported: i64 },

    #[error("failed to parse {file}: {message}")]
    ParseFailure { file: PathBuf, message: String },

    #[error("worker process crashed while handling {file}: {message}")]
    WorkerCrashed { file: PathBuf, message: String },

    #[error("worker pool unusable: {0}")]
    BrokenPool(String),

    #[error("index not ready: {0}")]
    NotReady(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("storage corruption detected: {0}")]
    StorageCorruption(String),

    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::error::StorageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl IndexError {
    /// The stable kind name used on the wire (§7's taxonomy), independent
    /// of this enum's Rust variant names or message text.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidProjectPath { .. } => "INVALID_PROJECT_PATH",
            Self::ParserUnavailable(_) => "PARSER_UNAVAILABLE",
            Self::SchemaTooNew { .. } => "SCHEMA_TOO_NEW",
            Self::ParseFailure { .. } => "PARSE_FAILURE",
            Self::WorkerCrashed { .. } => "WORKER_CRASHED",
            Self::BrokenPool(_) => "BROKEN_POOL",
            Self::NotReady(_) => "NOT_READY",
            Self::Cancelled => "CANCELLED",
            Self::StorageCorruption(_) => "STORAGE_CORRUPTION",
            Self::Storage(_) => "STORAGE_CORRUPTION",
            Self::Io(_) => "STORAGE_CORRUPTION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_match_spec_taxonomy() {
        let err = IndexError::NotReady("indexing in progress".into());
        assert_eq!(err.kind(), "NOT_READY");
        let err = IndexError::Cancelled;
        assert_eq!(err.kind(), "CANCELLED");
    }
}
