// audit.rs — In-memory audit log and observer interface.
//
// This is the single audit/trace pipeline: enforcement actions are always
// recorded here, and plain evaluations are recorded too when tracing is
// enabled on the engine. Observers (e.g. the persistent JSONL sink in
// gov-audit) receive every entry in the order it was appended.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decision::{DecisionKind, PolicyEvaluationResult, SourceAttempt};
use crate::source::{PolicyCategory, PolicySource};

/// Once the log grows past this many entries it is trimmed.
pub const MAX_AUDIT_ENTRIES: usize = 10_000;

/// How many of the oldest entries a trim drops at once.
pub const AUDIT_TRIM_BATCH: usize = 1_000;

/// Action label for entries produced by tracing plain evaluations.
pub const EVALUATE_ACTION: &str = "evaluate";

/// One policy-relevant event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub category: PolicyCategory,
    /// Tool id, plugin id, domain, memory category, version, ...
    pub subject: String,
    /// What was attempted ("execute", "load", "add", "request", ...).
    pub action: String,
    pub decision: DecisionKind,
    pub reason: String,
    pub source: PolicySource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Per-source attempts, present when the entry came from an evaluation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<SourceAttempt>,
}

impl AuditEntry {
    pub fn new(
        category: PolicyCategory,
        subject: impl Into<String>,
        action: impl Into<String>,
        decision: DecisionKind,
        reason: impl Into<String>,
        source: PolicySource,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            category,
            subject: subject.into(),
            action: action.into(),
            decision,
            reason: reason.into(),
            source,
            rule_id: None,
            attempts: Vec::new(),
        }
    }

    /// Build an entry describing an evaluation result.
    pub fn from_result(
        category: PolicyCategory,
        subject: impl Into<String>,
        action: impl Into<String>,
        result: &PolicyEvaluationResult,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: result.evaluated_at(),
            category,
            subject: subject.into(),
            action: action.into(),
            decision: result.decision().kind(),
            reason: result.reason().to_string(),
            source: result.source(),
            rule_id: result.rule_id().map(str::to_string),
            attempts: result.attempts().to_vec(),
        }
    }

    pub fn with_rule_id(mut self, rule_id: Option<String>) -> Self {
        self.rule_id = rule_id;
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Receives every entry appended to an engine's audit log.
///
/// Called while the engine lock is held so observers see one global order.
/// Implementations must not call back into the engine.
pub trait AuditObserver: Send + Sync {
    fn on_entry(&self, entry: &AuditEntry);
}

/// Bounded append-only log.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: VecDeque<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Past `MAX_AUDIT_ENTRIES` the oldest
    /// `AUDIT_TRIM_BATCH` entries are dropped in one go.
    pub fn push(&mut self, entry: AuditEntry) {
        self.entries.push_back(entry);
        if self.entries.len() > MAX_AUDIT_ENTRIES {
            let drop = AUDIT_TRIM_BATCH.min(self.entries.len());
            self.entries.drain(..drop);
            tracing::debug!(dropped = drop, "audit log trimmed");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AuditEntry> {
        self.entries.iter()
    }

    /// The most recent `n` entries, oldest first.
    pub fn tail(&self, n: usize) -> Vec<AuditEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
