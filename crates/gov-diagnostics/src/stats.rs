// stats.rs — Aggregate statistics over the audit log.
//
// Enforcement entries (what a guard actually did) and traced evaluations
// (plain `evaluate:*` entries recorded while tracing is on) are counted apart,
// so a guarded call that was also traced is not counted twice.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

use gov_policy::audit::EVALUATE_ACTION;
use gov_policy::{AuditEntry, DecisionKind, PolicyCategory, PolicyEngine, PolicySource};

/// How many denied subjects to report by default.
pub const DEFAULT_TOP_DENIED: usize = 10;

/// A subject that was denied, with how often.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DeniedSubject {
    pub category: PolicyCategory,
    pub subject: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PolicyStatistics {
    /// Enforcement entries counted below.
    pub total: usize,
    /// Plain evaluations recorded by tracing (not in the breakdowns).
    pub traced_evaluations: usize,
    pub by_decision: BTreeMap<DecisionKind, usize>,
    pub by_source: BTreeMap<PolicySource, usize>,
    pub by_category: BTreeMap<PolicyCategory, usize>,
    /// Most-denied subjects, highest count first.
    pub top_denied: Vec<DeniedSubject>,
    /// Earliest and latest enforcement entry (traced evaluations excluded,
    /// like every other figure except `traced_evaluations`).
    pub first_entry_at: Option<DateTime<Utc>>,
    pub last_entry_at: Option<DateTime<Utc>>,
}

impl PolicyStatistics {
    /// Compute statistics from a slice of entries (oldest first).
    pub fn from_entries(entries: &[AuditEntry], top_n: usize) -> Self {
        let mut stats = PolicyStatistics::default();
        let mut denied: HashMap<(PolicyCategory, &str), usize> = HashMap::new();

        for entry in entries {
            if is_traced_evaluation(entry) {
                stats.traced_evaluations += 1;
                continue;
            }
            stats.total += 1;
            stats.first_entry_at = Some(match stats.first_entry_at {
                Some(first) => first.min(entry.timestamp),
                None => entry.timestamp,
            });
            stats.last_entry_at = Some(match stats.last_entry_at {
                Some(last) => last.max(entry.timestamp),
                None => entry.timestamp,
            });
            *stats.by_decision.entry(entry.decision).or_default() += 1;
            *stats.by_source.entry(entry.source).or_default() += 1;
            *stats.by_category.entry(entry.category).or_default() += 1;
            if entry.decision == DecisionKind::Deny {
                *denied.entry((entry.category, &entry.subject)).or_default() += 1;
            }
        }

        let mut top: Vec<DeniedSubject> = denied
            .into_iter()
            .map(|((category, subject), count)| DeniedSubject {
                category,
                subject: subject.to_string(),
                count,
            })
            .collect();
        top.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.category.cmp(&b.category))
                .then_with(|| a.subject.cmp(&b.subject))
        });
        top.truncate(top_n);
        stats.top_denied = top;

        tracing::debug!(
            total = stats.total,
            traced = stats.traced_evaluations,
            "computed policy statistics"
        );
        stats
    }

    /// Statistics over an engine's current audit log.
    pub fn from_engine(engine: &PolicyEngine, top_n: usize) -> Self {
        Self::from_entries(&engine.audit_entries(), top_n)
    }

    pub fn count(&self, decision: DecisionKind) -> usize {
        self.by_decision.get(&decision).copied().unwrap_or(0)
    }

    /// Share of enforcement entries with `decision`, in `0.0..=1.0`.
    pub fn rate(&self, decision: DecisionKind) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.count(decision) as f64 / self.total as f64
    }
}

fn is_traced_evaluation(entry: &AuditEntry) -> bool {
    entry.action == EVALUATE_ACTION
        || entry
            .action
            .strip_prefix(EVALUATE_ACTION)
            .is_some_and(|rest| rest.starts_with(':'))
}
