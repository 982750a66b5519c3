// error.rs — Error types for diagnostics and export.

use thiserror::Error;

use gov_policy::PolicyError;

#[derive(Debug, Error)]
pub enum DiagnosticsError {
    /// The engine rejected a query (blank identifier and similar).
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// JSON export failed.
    #[error("export serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
