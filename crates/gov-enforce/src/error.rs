// error.rs — Error types for the enforcement wrappers.
//
// Policy outcomes (Blocked, RequiresApproval, Deferred) are *not* errors;
// they come back as `Outcome` values. These variants cover caller mistakes
// and failures inside the wrapped subsystems.

use thiserror::Error;

use gov_policy::PolicyError;

#[derive(Debug, Error)]
pub enum EnforceError {
    /// The engine rejected the request (blank identifier and similar).
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// A wrapped subsystem (tool executor, plugin host, ...) failed.
    #[error("{subsystem} failed: {message}")]
    Subsystem {
        subsystem: &'static str,
        message: String,
    },

    /// A connectivity endpoint could not be parsed or has no host.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// An update carries a version string that is not semver.
    #[error("invalid update version '{0}'")]
    InvalidVersion(String),

    /// A notification sink could not deliver an event.
    #[error("notification sink '{sink}' failed: {message}")]
    Sink { sink: String, message: String },
}

impl EnforceError {
    /// Convenience for collaborator implementations.
    pub fn subsystem(subsystem: &'static str, message: impl Into<String>) -> Self {
        EnforceError::Subsystem {
            subsystem,
            message: message.into(),
        }
    }
}
