//! # gov-diagnostics
//!
//! Read-only insight into a running [`gov_policy::PolicyEngine`]:
//!
//! - [`stats`]: counts by decision, source, and category, plus the most-denied
//!   subjects, computed from the engine's audit log.
//! - [`explain`]: per-source explanations built from an evaluation's attempts.
//! - [`viewer`]: status summary, per-source and per-subject views, and text /
//!   JSON export of the effective policy.
//!
//! Nothing in this crate changes engine state.

pub mod error;
pub mod explain;
pub mod stats;
pub mod viewer;

pub use error::DiagnosticsError;
pub use explain::{explain, explain_entry, Explanation, ExplanationStep};
pub use stats::{DeniedSubject, PolicyStatistics, DEFAULT_TOP_DENIED};
pub use viewer::{
    domain_view, effective_policy, export_json, export_text, plugin_view, source_view, status,
    tool_view, DecisionView, EffectivePolicy, SourceStatus, SourceView, StatusSummary,
};
