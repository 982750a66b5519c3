// decision.rs — Decisions, constraints, and evaluation results.
//
// PolicyEvaluationResult is the atomic unit the whole system communicates in.
// Its reason is never empty: every decision must be explainable.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::PolicySource;

/// A typed restriction attached to an `AllowWithConstraints` decision.
///
/// The set is closed: callers enforcing constraints upstream can match
/// exhaustively instead of probing a string-keyed bag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Constraint {
    /// At most `max_calls` invocations per `window_secs`.
    RateLimit { max_calls: u32, window_secs: u64 },
    /// Named fields must be redacted from inputs/outputs.
    RedactFields { fields: Vec<String> },
    /// Upper bound on payload size.
    MaxPayloadBytes { bytes: u64 },
    /// The capability may only be used without side effects.
    ReadOnly,
    /// Hard time limit for the operation.
    Timeout { secs: u64 },
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::RateLimit {
                max_calls,
                window_secs,
            } => write!(f, "rate limit {} calls / {}s", max_calls, window_secs),
            Constraint::RedactFields { fields } => write!(f, "redact [{}]", fields.join(", ")),
            Constraint::MaxPayloadBytes { bytes } => write!(f, "max payload {} bytes", bytes),
            Constraint::ReadOnly => write!(f, "read-only"),
            Constraint::Timeout { secs } => write!(f, "timeout {}s", secs),
        }
    }
}

/// The outcome of a policy evaluation.
///
/// Only `AllowWithConstraints` carries a payload, so a `Deny` with
/// constraints cannot be constructed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "constraints")]
pub enum PolicyDecision {
    Allow,
    Deny,
    AllowWithApproval,
    AllowWithConstraints(Vec<Constraint>),
}

impl PolicyDecision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            PolicyDecision::Allow => DecisionKind::Allow,
            PolicyDecision::Deny => DecisionKind::Deny,
            PolicyDecision::AllowWithApproval => DecisionKind::AllowWithApproval,
            PolicyDecision::AllowWithConstraints(_) => DecisionKind::AllowWithConstraints,
        }
    }

    /// Constraints carried by the decision (empty unless `AllowWithConstraints`).
    pub fn constraints(&self) -> &[Constraint] {
        match self {
            PolicyDecision::AllowWithConstraints(c) => c,
            _ => &[],
        }
    }
}

impl fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind().fmt(f)
    }
}

/// The decision vocabulary as it appears in policy documents, audit entries,
/// and statistics (no payload).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DecisionKind {
    Allow,
    Deny,
    AllowWithApproval,
    AllowWithConstraints,
}

impl DecisionKind {
    pub const ALL: [DecisionKind; 4] = [
        DecisionKind::Allow,
        DecisionKind::Deny,
        DecisionKind::AllowWithApproval,
        DecisionKind::AllowWithConstraints,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DecisionKind::Allow => "Allow",
            DecisionKind::Deny => "Deny",
            DecisionKind::AllowWithApproval => "AllowWithApproval",
            DecisionKind::AllowWithConstraints => "AllowWithConstraints",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        DecisionKind::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Build a full decision from this kind. Constraints are attached only
    /// to `AllowWithConstraints`; an empty list there degrades to `Allow`.
    pub fn with_constraints(self, constraints: &[Constraint]) -> PolicyDecision {
        match self {
            DecisionKind::Allow => PolicyDecision::Allow,
            DecisionKind::Deny => PolicyDecision::Deny,
            DecisionKind::AllowWithApproval => PolicyDecision::AllowWithApproval,
            DecisionKind::AllowWithConstraints if constraints.is_empty() => PolicyDecision::Allow,
            DecisionKind::AllowWithConstraints => {
                PolicyDecision::AllowWithConstraints(constraints.to_vec())
            }
        }
    }
}

impl fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which check inside a source produced a decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchStep {
    PluginsDisabled,
    RiskCeiling,
    DenyList,
    Rule,
    RequireApproval,
    AllowList,
    TrustedAuthor,
    LockedDefault,
    BlockedDomain,
    DomainNotAllowed,
    DomainAllowed,
    SessionGrant,
    BuiltInDefault,
    /// A merged setting (memory, connectivity, or update) decided.
    Setting,
}

impl fmt::Display for MatchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MatchStep::PluginsDisabled => "plugins disabled",
            MatchStep::RiskCeiling => "risk ceiling",
            MatchStep::DenyList => "deny list",
            MatchStep::Rule => "rule",
            MatchStep::RequireApproval => "require-approval list",
            MatchStep::AllowList => "allow list",
            MatchStep::TrustedAuthor => "trusted author",
            MatchStep::LockedDefault => "locked default",
            MatchStep::BlockedDomain => "blocked domain",
            MatchStep::DomainNotAllowed => "domain outside allow list",
            MatchStep::DomainAllowed => "allowed domain",
            MatchStep::SessionGrant => "session grant",
            MatchStep::BuiltInDefault => "built-in default",
            MatchStep::Setting => "merged setting",
        };
        f.write_str(label)
    }
}

/// What one source contributed while a decision was being resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// No document is loaded for this source.
    NotLoaded,
    /// The document was consulted and nothing matched.
    NoMatch {
        /// Rules whose pattern matched but whose conditions did not hold.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        conditions_unmet: Vec<String>,
    },
    /// This source decided.
    Decided {
        step: MatchStep,
        decision: DecisionKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rule_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
}

/// One entry in the ordered list of per-source attempts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceAttempt {
    pub source: PolicySource,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

impl SourceAttempt {
    pub fn not_loaded(source: PolicySource) -> Self {
        Self {
            source,
            outcome: AttemptOutcome::NotLoaded,
        }
    }

    pub fn no_match(source: PolicySource, conditions_unmet: Vec<String>) -> Self {
        Self {
            source,
            outcome: AttemptOutcome::NoMatch { conditions_unmet },
        }
    }

    pub fn decided(
        source: PolicySource,
        step: MatchStep,
        decision: DecisionKind,
        rule_id: Option<String>,
        pattern: Option<String>,
    ) -> Self {
        Self {
            source,
            outcome: AttemptOutcome::Decided {
                step,
                decision,
                rule_id,
                pattern,
            },
        }
    }

    pub fn is_decisive(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Decided { .. })
    }
}

/// An immutable, explainable evaluation result.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PolicyEvaluationResult {
    decision: PolicyDecision,
    reason: String,
    source: PolicySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule_id: Option<String>,
    evaluated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attempts: Vec<SourceAttempt>,
}

impl PolicyEvaluationResult {
    /// Create a result. A blank reason is replaced with a generated one so
    /// that no result is ever unexplained.
    pub fn new(decision: PolicyDecision, reason: impl Into<String>, source: PolicySource) -> Self {
        let mut reason = reason.into();
        if reason.trim().is_empty() {
            reason = format!("{} by {} policy", decision.kind(), source);
        }
        Self {
            decision,
            reason,
            source,
            source_path: None,
            rule_id: None,
            evaluated_at: Utc::now(),
            attempts: Vec::new(),
        }
    }

    pub fn with_rule_id(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    pub fn with_source_path(mut self, path: Option<PathBuf>) -> Self {
        self.source_path = path;
        self
    }

    pub fn with_attempts(mut self, attempts: Vec<SourceAttempt>) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn evaluated_at_time(mut self, at: DateTime<Utc>) -> Self {
        self.evaluated_at = at;
        self
    }

    pub fn decision(&self) -> &PolicyDecision {
        &self.decision
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn source(&self) -> PolicySource {
        self.source
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn rule_id(&self) -> Option<&str> {
        self.rule_id.as_deref()
    }

    pub fn constraints(&self) -> &[Constraint] {
        self.decision.constraints()
    }

    pub fn evaluated_at(&self) -> DateTime<Utc> {
        self.evaluated_at
    }

    /// Ordered per-source attempts, strongest source first.
    pub fn attempts(&self) -> &[SourceAttempt] {
        &self.attempts
    }

    /// `Allow` or `AllowWithConstraints`.
    pub fn is_allowed(&self) -> bool {
        matches!(
            self.decision,
            PolicyDecision::Allow | PolicyDecision::AllowWithConstraints(_)
        )
    }

    pub fn is_denied(&self) -> bool {
        self.decision == PolicyDecision::Deny
    }

    pub fn requires_approval(&self) -> bool {
        self.decision == PolicyDecision::AllowWithApproval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_reason_is_replaced() {
        let result = PolicyEvaluationResult::new(PolicyDecision::Deny, "   ", PolicySource::Team);
        assert_eq!(result.reason(), "Deny by team policy");
    }

    #[test]
    fn constraints_only_on_constrained_allow() {
        let rate = Constraint::RateLimit {
            max_calls: 5,
            window_secs: 60,
        };
        assert!(DecisionKind::Deny
            .with_constraints(std::slice::from_ref(&rate))
            .constraints()
            .is_empty());
        assert_eq!(
            DecisionKind::AllowWithConstraints.with_constraints(std::slice::from_ref(&rate)),
            PolicyDecision::AllowWithConstraints(vec![rate])
        );
        assert_eq!(
            DecisionKind::AllowWithConstraints.with_constraints(&[]),
            PolicyDecision::Allow
        );
    }

    #[test]
    fn constraint_json_uses_kind_tag() {
        let json = serde_json::to_value(Constraint::RateLimit {
            max_calls: 10,
            window_secs: 60,
        })
        .unwrap();
        assert_eq!(json["kind"], "rateLimit");
        assert_eq!(json["maxCalls"], 10);
        let read_only: Constraint = serde_json::from_str(r#"{"kind":"readOnly"}"#).unwrap();
        assert_eq!(read_only, Constraint::ReadOnly);
    }

    #[test]
    fn decision_kind_parses_document_vocabulary() {
        assert_eq!(
            DecisionKind::parse("AllowWithApproval"),
            Some(DecisionKind::AllowWithApproval)
        );
        assert_eq!(DecisionKind::parse("allow"), None);
    }

    #[test]
    fn allowed_predicates() {
        let constrained = PolicyEvaluationResult::new(
            PolicyDecision::AllowWithConstraints(vec![Constraint::ReadOnly]),
            "ok",
            PolicySource::User,
        );
        assert!(constrained.is_allowed());
        assert!(!constrained.requires_approval());
        assert_eq!(constrained.constraints(), &[Constraint::ReadOnly]);
    }
}
