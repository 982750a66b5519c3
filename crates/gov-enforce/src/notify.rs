// notify.rs — Enforcement notifications and their dispatch.
//
// Wrappers raise an event whenever policy stops or reshapes an operation:
//   blocked            — a Deny was enforced
//   approval_required  — an AllowWithApproval had no session grant
//   purged             — retention or count limits removed memories
//   deferred           — an update is held back by the deferral window
//
// Sinks subscribe explicitly through a NotificationDispatcher; there is no
// global event bus. Sink errors are logged and never change a decision.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gov_policy::{PolicyCategory, PolicySource};

use crate::error::EnforceError;

/// Why memories were purged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PurgeReason {
    Retention,
    CountLimit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EnforcementEvent {
    Blocked {
        category: PolicyCategory,
        subject: String,
        action: String,
        reason: String,
        source: PolicySource,
        timestamp: DateTime<Utc>,
    },
    ApprovalRequired {
        category: PolicyCategory,
        subject: String,
        action: String,
        reason: String,
        source: PolicySource,
        timestamp: DateTime<Utc>,
    },
    Purged {
        reason: PurgeReason,
        count: usize,
        timestamp: DateTime<Utc>,
    },
    Deferred {
        version: String,
        until: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
}

impl EnforcementEvent {
    pub fn event_type(&self) -> &str {
        match self {
            EnforcementEvent::Blocked { .. } => "blocked",
            EnforcementEvent::ApprovalRequired { .. } => "approval_required",
            EnforcementEvent::Purged { .. } => "purged",
            EnforcementEvent::Deferred { .. } => "deferred",
        }
    }
}

/// Receives enforcement events.
pub trait EnforcementSink: Send + Sync {
    /// Handle an event. Errors are logged by the dispatcher.
    fn send(&self, event: &EnforcementEvent) -> Result<(), EnforceError>;
}

/// Writes every event to the tracing log.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EnforcementSink for TracingSink {
    fn send(&self, event: &EnforcementEvent) -> Result<(), EnforceError> {
        match event {
            EnforcementEvent::Blocked {
                category,
                subject,
                reason,
                ..
            } => tracing::warn!(category = %category, subject = %subject, reason = %reason, "blocked by policy"),
            EnforcementEvent::ApprovalRequired {
                category, subject, ..
            } => tracing::info!(category = %category, subject = %subject, "approval required"),
            EnforcementEvent::Purged { reason, count, .. } => {
                tracing::info!(?reason, count, "memories purged")
            }
            EnforcementEvent::Deferred { version, until, .. } => {
                tracing::info!(version = %version, until = %until, "update deferred")
            }
        }
        Ok(())
    }
}

/// Keeps every event in memory (host UIs poll it; tests assert on it).
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<EnforcementEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EnforcementEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Remove and return everything received so far.
    pub fn drain(&self) -> Vec<EnforcementEvent> {
        self.events
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

impl EnforcementSink for MemorySink {
    fn send(&self, event: &EnforcementEvent) -> Result<(), EnforceError> {
        self.events
            .lock()
            .map_err(|_| EnforceError::Sink {
                sink: "memory".to_string(),
                message: "event buffer lock poisoned".to_string(),
            })?
            .push(event.clone());
        Ok(())
    }
}

/// Fans each event out to every registered sink.
#[derive(Default)]
pub struct NotificationDispatcher {
    sinks: Vec<Arc<dyn EnforcementSink>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn add_sink(&mut self, sink: Arc<dyn EnforcementSink>) {
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: Arc<dyn EnforcementSink>) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn dispatch(&self, event: &EnforcementEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.send(event) {
                tracing::warn!("enforcement sink error: {}", e);
            }
        }
    }
}
