// explain.rs — Human-readable explanations built from per-source attempts.
//
// Every evaluation carries the ordered list of sources it consulted. An
// explanation turns that list into one line per source, so an operator can
// see which sources were skipped (not loaded, nothing matched, conditions
// unmet) before the deciding one.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use gov_policy::{
    AttemptOutcome, AuditEntry, DecisionKind, PolicyEvaluationResult, PolicySource, SourceAttempt,
};

/// One source's part in a decision.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExplanationStep {
    pub source: PolicySource,
    pub decisive: bool,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Explanation {
    pub decision: DecisionKind,
    pub source: PolicySource,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    pub steps: Vec<ExplanationStep>,
}

impl Explanation {
    /// The step that produced the decision, if any source decided.
    pub fn decisive_step(&self) -> Option<&ExplanationStep> {
        self.steps.iter().rev().find(|s| s.decisive)
    }

    /// Sources consulted before the deciding one that contributed nothing.
    pub fn skipped_sources(&self) -> Vec<PolicySource> {
        self.steps
            .iter()
            .filter(|s| !s.decisive)
            .map(|s| s.source)
            .collect()
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.decision, self.source, self.reason)?;
        if let Some(rule) = &self.rule_id {
            write!(f, " [rule {}]", rule)?;
        }
        if let Some(path) = &self.source_path {
            write!(f, "\n  from {}", path.display())?;
        }
        for (i, step) in self.steps.iter().enumerate() {
            let marker = if step.decisive { "*" } else { " " };
            write!(f, "\n  {}{}. {}", marker, i + 1, step.note)?;
        }
        Ok(())
    }
}

/// Explain an evaluation result.
pub fn explain(result: &PolicyEvaluationResult) -> Explanation {
    Explanation {
        decision: result.decision().kind(),
        source: result.source(),
        reason: result.reason().to_string(),
        rule_id: result.rule_id().map(str::to_string),
        source_path: result.source_path().map(|p| p.to_path_buf()),
        steps: steps(result.attempts(), result.decision().kind(), result.source()),
    }
}

/// Explain a recorded audit entry (as precise as the attempts it stored).
pub fn explain_entry(entry: &AuditEntry) -> Explanation {
    Explanation {
        decision: entry.decision,
        source: entry.source,
        reason: entry.reason.clone(),
        rule_id: entry.rule_id.clone(),
        source_path: None,
        steps: steps(&entry.attempts, entry.decision, entry.source),
    }
}

fn steps(
    attempts: &[SourceAttempt],
    decision: DecisionKind,
    source: PolicySource,
) -> Vec<ExplanationStep> {
    let mut steps: Vec<ExplanationStep> = attempts.iter().map(describe).collect();
    if source == PolicySource::Default && !steps.iter().any(|s| s.decisive) {
        steps.push(ExplanationStep {
            source: PolicySource::Default,
            decisive: true,
            note: format!("no source decided; built-in default is {}", decision),
        });
    }
    steps
}

fn describe(attempt: &SourceAttempt) -> ExplanationStep {
    let source = attempt.source;
    let note = match &attempt.outcome {
        AttemptOutcome::NotLoaded => format!("{}: no policy loaded", source),
        AttemptOutcome::NoMatch { conditions_unmet } if conditions_unmet.is_empty() => {
            format!("{}: nothing matched", source)
        }
        AttemptOutcome::NoMatch { conditions_unmet } => format!(
            "{}: nothing matched (conditions not met for {})",
            source,
            conditions_unmet.join(", ")
        ),
        AttemptOutcome::Decided {
            step,
            decision,
            rule_id,
            pattern,
        } => {
            let mut note = format!("{}: {} via {}", source, decision, step);
            if let Some(pattern) = pattern {
                note.push_str(&format!(" '{}'", pattern));
            }
            if let Some(rule) = rule_id {
                note.push_str(&format!(" (rule {})", rule));
            }
            note
        }
    };
    ExplanationStep {
        source,
        decisive: attempt.is_decisive(),
        note,
    }
}
