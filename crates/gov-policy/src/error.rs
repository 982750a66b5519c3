// error.rs — Error types for the policy subsystem.

use std::path::PathBuf;

use thiserror::Error;

use crate::source::PolicySource;
use crate::validate::ValidationIssue;

/// Errors that can occur during policy operations.
///
/// Evaluation itself never fails for business reasons; these variants cover
/// caller contract violations and document handling.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The caller passed a blank or otherwise unusable identifier.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// The document failed validation. Every problem found is listed.
    #[error("policy document for {origin} failed validation with {} issue(s)", .issues.len())]
    Validation {
        origin: PolicySource,
        issues: Vec<ValidationIssue>,
    },

    /// Documents cannot be attached to the built-in Default source.
    #[error("source {0} cannot hold a policy document")]
    UnsupportedSource(PolicySource),

    /// Reading a policy file failed.
    #[error("failed to read policy file at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A policy file is not well-formed JSON.
    #[error("malformed policy JSON at {path}: {source}")]
    MalformedJson {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Failed to serialize or deserialize a document.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl PolicyError {
    /// Issues carried by a validation failure (empty for other variants).
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            PolicyError::Validation { issues, .. } => issues,
            _ => &[],
        }
    }
}
