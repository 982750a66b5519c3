//! # gov-policy
//!
//! Multi-source capability policy for Governor.
//!
//! Policy documents come from up to four sources (Organization, Team, User,
//! Session). The [`PolicyEngine`] merges them and answers two kinds of
//! questions:
//!
//! - **Decisions** for tools, plugins, and network domains: sources are walked
//!   in precedence order and the first source that decides wins. Every answer
//!   is a [`PolicyEvaluationResult`] carrying its reason, source, and the list
//!   of per-source attempts that led to it.
//! - **Settings** for memory, connectivity, and updates: scalars take the
//!   strongest stated value, restriction lists are unioned across sources.
//!
//! ## Key invariants
//!
//! - **Precedence**: once a stronger source decides, weaker sources are never
//!   consulted.
//! - **Restrictions only accumulate**: a weaker source can add a blocked
//!   domain or excluded memory category but cannot remove one.
//! - **Every decision is explainable**: a result's reason is never empty.
//! - **All-or-nothing documents**: validation reports every problem at once
//!   and a rejected document is never partially applied.

pub mod audit;
pub mod clock;
pub mod condition;
pub mod decision;
pub mod document;
pub mod domain;
pub mod engine;
pub mod error;
pub mod grants;
pub mod loader;
pub mod pattern;
pub mod settings;
pub mod source;
pub mod validate;
pub mod version;

pub use audit::{AuditEntry, AuditLog, AuditObserver, AUDIT_TRIM_BATCH, MAX_AUDIT_ENTRIES};
pub use clock::{Clock, FixedClock, SystemClock};
pub use condition::{RuleConditions, TimeRange};
pub use decision::{
    AttemptOutcome, Constraint, DecisionKind, MatchStep, PolicyDecision, PolicyEvaluationResult,
    SourceAttempt,
};
pub use document::{
    ConnectivityMode, ConnectivityPolicy, MemoryPolicy, PluginPolicy, PluginRule, PolicyDocument,
    RiskLevel, ToolPolicy, ToolRule, UpdateChannel, UpdatePolicy, CURRENT_SCHEMA_VERSION,
};
pub use engine::{LoadedDocument, PolicyEngine};
pub use error::PolicyError;
pub use grants::SessionGrant;
pub use loader::{
    load_from_locations, read_document, LoadOutcome, LoadSummary, PolicyLocations, SourceLoad,
};
pub use settings::{MergedConnectivitySettings, MergedMemorySettings, MergedUpdateSettings};
pub use source::{PolicyCategory, PolicySource};
pub use validate::{parse_document, validate_document, IssueKind, ValidationIssue};
pub use version::Version;
