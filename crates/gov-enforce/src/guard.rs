// guard.rs — The check → delegate → audit flow shared by every wrapper.
//
// A wrapper turns a PolicyEvaluationResult into one of three paths:
//
// 1. Deny              → "blocked" notification, Outcome::Blocked
// 2. AllowWithApproval → "approval required" notification unless a session
//                        grant exists, Outcome::RequiresApproval
// 3. Allow / AllowWithConstraints → delegate to the wrapped subsystem
//
// Every gated operation is appended to the engine's audit log, whatever the
// path. Constraints are surfaced to the caller, not applied here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use gov_policy::{
    Constraint, DecisionKind, MatchStep, PolicyCategory, PolicyDecision,
    PolicyEngine, PolicyEvaluationResult, PolicySource, SessionGrant, SourceAttempt,
};

use crate::error::EnforceError;
use crate::notify::{EnforcementEvent, NotificationDispatcher};

/// What happened to a guarded operation.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<T> {
    /// Policy allowed the operation and the subsystem completed it.
    Completed {
        output: T,
        decision: PolicyEvaluationResult,
    },
    /// Policy denied the operation; the subsystem was never called.
    Blocked { decision: PolicyEvaluationResult },
    /// Policy requires approval and no session grant exists.
    RequiresApproval { decision: PolicyEvaluationResult },
    /// Held back until `until` (update deferral).
    Deferred { until: DateTime<Utc>, reason: String },
}

impl<T> Outcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed { .. })
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, Outcome::Blocked { .. })
    }

    pub fn requires_approval(&self) -> bool {
        matches!(self, Outcome::RequiresApproval { .. })
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Outcome::Deferred { .. })
    }

    pub fn output(&self) -> Option<&T> {
        match self {
            Outcome::Completed { output, .. } => Some(output),
            _ => None,
        }
    }

    pub fn into_output(self) -> Option<T> {
        match self {
            Outcome::Completed { output, .. } => Some(output),
            _ => None,
        }
    }

    /// The policy result behind this outcome (None for a deferral).
    pub fn decision(&self) -> Option<&PolicyEvaluationResult> {
        match self {
            Outcome::Completed { decision, .. }
            | Outcome::Blocked { decision }
            | Outcome::RequiresApproval { decision } => Some(decision),
            Outcome::Deferred { .. } => None,
        }
    }

    /// Constraints the caller must enforce upstream.
    pub fn constraints(&self) -> &[Constraint] {
        self.decision().map(|d| d.constraints()).unwrap_or(&[])
    }

    /// Human-readable reason for the outcome.
    pub fn reason(&self) -> &str {
        match self {
            Outcome::Deferred { reason, .. } => reason,
            other => other.decision().map(|d| d.reason()).unwrap_or_default(),
        }
    }
}

/// Session-grant management for one category.
///
/// Grants are in-memory only and independent of persisted documents.
#[derive(Clone)]
pub struct Approvals {
    engine: Arc<PolicyEngine>,
    category: PolicyCategory,
}

impl Approvals {
    pub(crate) fn new(engine: Arc<PolicyEngine>, category: PolicyCategory) -> Self {
        Self { engine, category }
    }

    pub fn category(&self) -> PolicyCategory {
        self.category
    }

    pub fn grant(&self, subject: &str, granted_by: &str) -> Result<SessionGrant, EnforceError> {
        Ok(self.engine.grant(self.category, subject, granted_by)?)
    }

    pub fn revoke(&self, subject: &str) -> bool {
        self.engine.revoke(self.category, subject)
    }

    pub fn clear_grants(&self) -> usize {
        self.engine.clear_grants(Some(self.category))
    }

    pub fn grants(&self) -> Vec<SessionGrant> {
        self.engine.grants(Some(self.category))
    }

    pub fn is_granted(&self, subject: &str) -> bool {
        self.engine.has_grant(self.category, subject)
    }
}

/// Shared plumbing owned by each wrapper.
pub(crate) struct Enforcer {
    pub(crate) engine: Arc<PolicyEngine>,
    notifier: Arc<NotificationDispatcher>,
    pub(crate) approvals: Approvals,
}

impl Enforcer {
    pub(crate) fn new(
        engine: Arc<PolicyEngine>,
        notifier: Arc<NotificationDispatcher>,
        category: PolicyCategory,
    ) -> Self {
        let approvals = Approvals::new(engine.clone(), category);
        Self {
            engine,
            notifier,
            approvals,
        }
    }

    pub(crate) fn category(&self) -> PolicyCategory {
        self.approvals.category()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.engine.clock().now()
    }

    pub(crate) fn notify(&self, event: EnforcementEvent) {
        self.notifier.dispatch(&event);
    }

    /// Build a result for a wrapper-level decision (one the engine's decision
    /// tree does not cover, such as "memory disabled").
    pub(crate) fn decide(
        &self,
        decision: PolicyDecision,
        reason: impl Into<String>,
        source: PolicySource,
        step: MatchStep,
    ) -> PolicyEvaluationResult {
        let attempt = SourceAttempt::decided(source, step, decision.kind(), None, None);
        PolicyEvaluationResult::new(decision, reason, source)
            .with_attempts(vec![attempt])
            .evaluated_at_time(self.now())
    }

    /// Convert an AllowWithApproval into Allow sourced Session when a grant
    /// for `grant_subject` exists. Engine tree results already had this
    /// applied; this covers wrapper-level approvals.
    pub(crate) fn apply_grant(
        &self,
        result: PolicyEvaluationResult,
        grant_subject: &str,
    ) -> PolicyEvaluationResult {
        if !result.requires_approval() || !self.approvals.is_granted(grant_subject) {
            return result;
        }
        let mut attempts = result.attempts().to_vec();
        attempts.push(SourceAttempt::decided(
            PolicySource::Session,
            MatchStep::SessionGrant,
            DecisionKind::Allow,
            None,
            None,
        ));
        PolicyEvaluationResult::new(
            PolicyDecision::Allow,
            format!("'{}' approved for this session ({})", grant_subject, result.reason()),
            PolicySource::Session,
        )
        .with_attempts(attempts)
        .evaluated_at_time(self.now())
    }

    /// Record the attempt and decide whether the caller may proceed.
    ///
    /// `Ok(result)` means delegate; `Err(outcome)` is the final outcome.
    pub(crate) fn gate<T>(
        &self,
        subject: &str,
        action: &str,
        result: PolicyEvaluationResult,
    ) -> Result<PolicyEvaluationResult, Outcome<T>> {
        self.engine
            .record_result(self.category(), subject, action, &result);

        match result.decision() {
            PolicyDecision::Deny => {
                self.notify(EnforcementEvent::Blocked {
                    category: self.category(),
                    subject: subject.to_string(),
                    action: action.to_string(),
                    reason: result.reason().to_string(),
                    source: result.source(),
                    timestamp: self.now(),
                });
                Err(Outcome::Blocked { decision: result })
            }
            PolicyDecision::AllowWithApproval => {
                self.notify(EnforcementEvent::ApprovalRequired {
                    category: self.category(),
                    subject: subject.to_string(),
                    action: action.to_string(),
                    reason: result.reason().to_string(),
                    source: result.source(),
                    timestamp: self.now(),
                });
                Err(Outcome::RequiresApproval { decision: result })
            }
            PolicyDecision::Allow | PolicyDecision::AllowWithConstraints(_) => Ok(result),
        }
    }
}
