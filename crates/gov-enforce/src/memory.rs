// memory.rs — Policy-gated memory store.
//
// Writes are checked against the merged memory settings:
//
// 1. memory disabled           → Deny
// 2. category excluded         → Deny
// 3. auto-formed item while autoFormation is off
//                              → AllowWithApproval (grant subject = category)
// 4. otherwise                 → Allow
//
// Retention and count limits are applied on demand and report how many items
// they purged.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use gov_policy::{
    AuditEntry, DecisionKind, MatchStep, MergedMemorySettings, PolicyCategory, PolicyDecision,
    PolicyEngine, PolicyEvaluationResult, PolicySource,
};

use crate::error::EnforceError;
use crate::guard::{Approvals, Enforcer, Outcome};
use crate::notify::{EnforcementEvent, NotificationDispatcher, PurgeReason};

/// One remembered fact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryItem {
    pub id: String,
    pub category: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Formed by the assistant on its own rather than requested by the user.
    #[serde(default)]
    pub auto_formed: bool,
}

impl MemoryItem {
    pub fn new(
        id: impl Into<String>,
        category: impl Into<String>,
        content: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            content: content.into(),
            created_at,
            auto_formed: false,
        }
    }

    pub fn auto_formed(mut self) -> Self {
        self.auto_formed = true;
        self
    }
}

/// The wrapped memory backend.
pub trait MemoryStore: Send + Sync {
    fn add(&self, item: MemoryItem) -> Result<(), EnforceError>;
    /// Returns false when no item had this id.
    fn remove(&self, id: &str) -> Result<bool, EnforceError>;
    /// Replace the item with the same id. Returns false when absent.
    fn update(&self, item: MemoryItem) -> Result<bool, EnforceError>;
    fn all(&self) -> Result<Vec<MemoryItem>, EnforceError>;
}

/// In-memory store, for tests and hosts without persistence.
#[derive(Debug, Default)]
pub struct VecMemoryStore {
    items: Mutex<Vec<MemoryItem>>,
}

impl VecMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MemoryItem>> {
        self.items.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl MemoryStore for VecMemoryStore {
    fn add(&self, item: MemoryItem) -> Result<(), EnforceError> {
        self.lock().push(item);
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<bool, EnforceError> {
        let mut items = self.lock();
        let before = items.len();
        items.retain(|i| i.id != id);
        Ok(items.len() != before)
    }

    fn update(&self, item: MemoryItem) -> Result<bool, EnforceError> {
        let mut items = self.lock();
        match items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => {
                *existing = item;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn all(&self) -> Result<Vec<MemoryItem>, EnforceError> {
        Ok(self.lock().clone())
    }
}

/// Applies memory policy around a store.
pub struct MemoryGuard<S> {
    store: S,
    enforcer: Enforcer,
}

impl<S: MemoryStore> MemoryGuard<S> {
    pub fn new(store: S, engine: Arc<PolicyEngine>, notifier: Arc<NotificationDispatcher>) -> Self {
        Self {
            store,
            enforcer: Enforcer::new(engine, notifier, PolicyCategory::Memory),
        }
    }

    pub fn settings(&self) -> MergedMemorySettings {
        self.enforcer.engine.evaluate_memory_policy()
    }

    /// Whether `item` may be written. Not audited.
    pub fn check_memory_write(&self, item: &MemoryItem) -> PolicyEvaluationResult {
        let settings = self.settings();
        if !settings.enabled {
            let source = settings.source_of("enabled");
            return self.enforcer.decide(
                PolicyDecision::Deny,
                format!("memory is disabled by {} policy", source),
                source,
                MatchStep::Setting,
            );
        }
        if settings.is_category_excluded(&item.category) {
            let source = settings.source_of("excludeCategories");
            return self.enforcer.decide(
                PolicyDecision::Deny,
                format!("memory category '{}' is excluded", item.category),
                source,
                MatchStep::Setting,
            );
        }
        if item.auto_formed && !settings.auto_formation {
            let pending = self.enforcer.decide(
                PolicyDecision::AllowWithApproval,
                format!(
                    "automatic memory formation is off; '{}' needs approval",
                    item.category
                ),
                settings.source_of("autoFormation"),
                MatchStep::Setting,
            );
            return self.enforcer.apply_grant(pending, &item.category);
        }
        self.enforcer.decide(
            PolicyDecision::Allow,
            "memory write permitted",
            PolicySource::Default,
            MatchStep::BuiltInDefault,
        )
    }

    pub fn add(&self, item: MemoryItem) -> Result<Outcome<()>, EnforceError> {
        let result = self.check_memory_write(&item);
        let decision = match self.enforcer.gate(&item.category, "add", result) {
            Ok(decision) => decision,
            Err(outcome) => return Ok(outcome),
        };
        self.store.add(item)?;
        Ok(Outcome::Completed {
            output: (),
            decision,
        })
    }

    /// Update an existing item. The new content is checked like a fresh write;
    /// the output is false when the store had no such id.
    pub fn update(&self, item: MemoryItem) -> Result<Outcome<bool>, EnforceError> {
        let result = self.check_memory_write(&item);
        let decision = match self.enforcer.gate(&item.category, "update", result) {
            Ok(decision) => decision,
            Err(outcome) => return Ok(outcome),
        };
        let updated = self.store.update(item)?;
        Ok(Outcome::Completed {
            output: updated,
            decision,
        })
    }

    /// Forgetting is always permitted, and always audited.
    pub fn remove(&self, id: &str) -> Result<bool, EnforceError> {
        let removed = self.store.remove(id)?;
        let reason = if removed {
            "forgetting is always permitted"
        } else {
            "forgetting is always permitted (no such item)"
        };
        let entry = AuditEntry::new(
            PolicyCategory::Memory,
            id,
            "remove",
            DecisionKind::Allow,
            reason,
            PolicySource::Default,
        )
        .at(self.enforcer.now());
        self.enforcer.engine.record_audit(entry);
        tracing::debug!(id, removed, "memory item removed");
        Ok(removed)
    }

    pub fn export(&self) -> Result<Outcome<Vec<MemoryItem>>, EnforceError> {
        let settings = self.settings();
        let result = if settings.allow_export {
            self.enforcer.decide(
                PolicyDecision::Allow,
                "memory export permitted",
                settings.source_of("allowExport"),
                MatchStep::Setting,
            )
        } else {
            let source = settings.source_of("allowExport");
            self.enforcer.decide(
                PolicyDecision::Deny,
                format!("memory export is disabled by {} policy", source),
                source,
                MatchStep::Setting,
            )
        };
        let decision = match self.enforcer.gate("*", "export", result) {
            Ok(decision) => decision,
            Err(outcome) => return Ok(outcome),
        };
        let items = self.store.all()?;
        Ok(Outcome::Completed {
            output: items,
            decision,
        })
    }

    /// Import items. Import as a whole is gated by `allowImport`; each item
    /// then goes through the normal write check and is skipped unless allowed.
    /// The output is the number of items written.
    pub fn import(&self, items: Vec<MemoryItem>) -> Result<Outcome<usize>, EnforceError> {
        let settings = self.settings();
        let source = settings.source_of("allowImport");
        let result = if settings.allow_import {
            self.enforcer.decide(
                PolicyDecision::Allow,
                "memory import permitted",
                source,
                MatchStep::Setting,
            )
        } else {
            self.enforcer.decide(
                PolicyDecision::Deny,
                format!("memory import is disabled by {} policy", source),
                source,
                MatchStep::Setting,
            )
        };
        let decision = match self.enforcer.gate("*", "import", result) {
            Ok(decision) => decision,
            Err(outcome) => return Ok(outcome),
        };

        let mut imported = 0;
        for item in items {
            if self.check_memory_write(&item).is_allowed() {
                self.store.add(item)?;
                imported += 1;
            } else {
                tracing::debug!(id = %item.id, category = %item.category, "import skipped item");
            }
        }
        Ok(Outcome::Completed {
            output: imported,
            decision,
        })
    }

    /// Remove items older than the retention window. Returns the purge count.
    pub fn apply_retention(&self) -> Result<usize, EnforceError> {
        let settings = self.settings();
        let Some(days) = settings.max_retention_days else {
            return Ok(0);
        };
        let cutoff = self.enforcer.now() - Duration::days(i64::from(days));
        let expired: Vec<MemoryItem> = self
            .store
            .all()?
            .into_iter()
            .filter(|item| item.created_at < cutoff)
            .collect();
        let purged = self.purge(&expired)?;
        self.report_purge(
            PurgeReason::Retention,
            purged,
            settings.source_of("maxRetentionDays"),
            format!("{} memories older than {} days purged", purged, days),
        );
        Ok(purged)
    }

    /// Remove the oldest items beyond the count limit. Returns the purge count.
    pub fn enforce_count_limit(&self) -> Result<usize, EnforceError> {
        let settings = self.settings();
        let Some(limit) = settings.max_memories else {
            return Ok(0);
        };
        let mut items = self.store.all()?;
        let limit = limit as usize;
        if items.len() <= limit {
            return Ok(0);
        }
        items.sort_by_key(|item| item.created_at);
        let excess = items.len() - limit;
        items.truncate(excess);
        let purged = self.purge(&items)?;
        self.report_purge(
            PurgeReason::CountLimit,
            purged,
            settings.source_of("maxMemories"),
            format!("{} memories over the limit of {} purged", purged, limit),
        );
        Ok(purged)
    }

    /// Retention first, then the count limit.
    pub fn enforce_limits(&self) -> Result<usize, EnforceError> {
        Ok(self.apply_retention()? + self.enforce_count_limit()?)
    }

    /// Session grants for memory categories.
    pub fn approvals(&self) -> &Approvals {
        &self.enforcer.approvals
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn purge(&self, items: &[MemoryItem]) -> Result<usize, EnforceError> {
        let mut purged = 0;
        for item in items {
            if self.store.remove(&item.id)? {
                purged += 1;
            }
        }
        Ok(purged)
    }

    fn report_purge(&self, reason: PurgeReason, count: usize, source: PolicySource, message: String) {
        if count == 0 {
            return;
        }
        tracing::info!(count, reason = ?reason, "memories purged");
        let entry = AuditEntry::new(
            PolicyCategory::Memory,
            "*",
            "purge",
            DecisionKind::Allow,
            message,
            source,
        )
        .at(self.enforcer.now());
        self.enforcer.engine.record_audit(entry);
        self.enforcer.notify(EnforcementEvent::Purged {
            reason,
            count,
            timestamp: self.enforcer.now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gov_policy::{FixedClock, PolicyDocument};

    use crate::notify::MemorySink;

    fn now() -> DateTime<Utc> {
        "2026-06-01T12:00:00Z".parse().unwrap()
    }

    fn guard(json: &str) -> (MemoryGuard<VecMemoryStore>, Arc<MemorySink>) {
        let engine = Arc::new(PolicyEngine::with_clock(Arc::new(FixedClock::new(now()))));
        let doc = PolicyDocument::from_json_str(json, PolicySource::Organization).unwrap();
        engine.set_document(PolicySource::Organization, doc).unwrap();
        let sink = Arc::new(MemorySink::new());
        let notifier = Arc::new(NotificationDispatcher::new().with_sink(sink.clone()));
        (MemoryGuard::new(VecMemoryStore::new(), engine, notifier), sink)
    }

    fn item(id: &str, category: &str, age_days: i64) -> MemoryItem {
        MemoryItem::new(id, category, "content", now() - Duration::days(age_days))
    }

    #[test]
    fn excluded_category_is_blocked() {
        let (guard, sink) = guard(r#"{"memory":{"excludeCategories":["Health"]}}"#);
        let outcome = guard.add(item("m1", "health", 0)).unwrap();
        assert!(outcome.is_blocked());
        assert!(guard.store().is_empty());
        assert_eq!(sink.events()[0].event_type(), "blocked");
    }

    #[test]
    fn disabled_memory_blocks_every_write() {
        let (guard, _) = guard(r#"{"memory":{"enabled":false}}"#);
        let result = guard.check_memory_write(&item("m1", "notes", 0));
        assert!(result.is_denied());
        assert_eq!(result.source(), PolicySource::Organization);
    }

    #[test]
    fn auto_formed_items_need_approval_per_category() {
        let (guard, _) = guard(r#"{"memory":{"autoFormation":false}}"#);
        let auto = item("m1", "preferences", 0).auto_formed();
        assert!(guard.add(auto.clone()).unwrap().requires_approval());
        // User-requested items are unaffected.
        assert!(guard.add(item("m2", "preferences", 0)).unwrap().is_completed());

        guard.approvals().grant("preferences", "user").unwrap();
        assert!(guard.add(auto).unwrap().is_completed());
        assert_eq!(guard.store().len(), 2);
    }

    #[test]
    fn export_and_import_follow_settings() {
        let (guard, _) = guard(
            r#"{"memory":{"allowExport":false,"excludeCategories":["secrets"]}}"#,
        );
        assert!(guard.export().unwrap().is_blocked());

        let outcome = guard
            .import(vec![item("a", "notes", 1), item("b", "secrets", 1)])
            .unwrap();
        assert_eq!(outcome.output(), Some(&1));
        assert_eq!(guard.store().len(), 1);
    }

    #[test]
    fn update_replaces_existing_item() {
        let (guard, _) = guard("{}");
        guard.add(item("m1", "notes", 0)).unwrap();
        let mut changed = item("m1", "notes", 0);
        changed.content = "updated".to_string();
        assert_eq!(guard.update(changed).unwrap().output(), Some(&true));
        assert_eq!(guard.store().all().unwrap()[0].content, "updated");
        assert!(guard.remove("m1").unwrap());
    }

    #[test]
    fn remove_is_ungated_but_audited() {
        let (guard, sink) = guard(r#"{"memory":{"enabled":false}}"#);
        guard.store().add(item("m1", "notes", 0)).unwrap();

        assert!(guard.remove("m1").unwrap());
        assert!(!guard.remove("m1").unwrap());
        assert!(guard.store().is_empty());
        assert!(sink.events().is_empty());

        let entries = guard.enforcer.engine.audit_entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.action == "remove"
            && e.subject == "m1"
            && e.decision == DecisionKind::Allow
            && e.category == PolicyCategory::Memory
            && e.timestamp == now()));
    }
}
