// error.rs — Error types for the persistent audit journal.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while writing, reading, or verifying the journal.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to open or create the journal file.
    #[error("failed to open audit journal at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Failed to write a record.
    #[error("failed to append audit record: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// A line is not a valid record.
    #[error("malformed audit record at line {line}: {source}")]
    MalformedRecord {
        line: usize,
        source: serde_json::Error,
    },

    /// Failed to serialize a record.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// The hash chain is broken: a record was inserted, removed, or edited.
    #[error("integrity check failed at line {line}: expected hash {expected}, got {actual}")]
    IntegrityViolation {
        line: usize,
        expected: String,
        actual: String,
    },

    /// Failed to read a file for fingerprinting.
    #[error("failed to hash file at {path}: {source}")]
    HashFileFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}
