// plugin.rs — Policy-gated plugin loading.
//
// The declared risk level is checked against each source's ceiling before any
// id rule, so an allow-list entry cannot admit a plugin that is too capable.
// Unloading is never gated; it is only recorded.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use gov_policy::{
    AuditEntry, DecisionKind, PolicyCategory, PolicyEngine, PolicyEvaluationResult, PolicySource,
    RiskLevel,
};

use crate::error::EnforceError;
use crate::guard::{Approvals, Enforcer, Outcome};
use crate::notify::NotificationDispatcher;

/// Identity and declared capability of a plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Undeclared risk is treated as the most capable tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
}

/// The wrapped plugin runtime.
#[async_trait]
pub trait PluginHost: Send + Sync {
    /// Whatever the host needs to bring a plugin up (module handle, config...).
    type Instance: Send + 'static;

    async fn load_plugin(
        &self,
        manifest: &PluginManifest,
        instance: Self::Instance,
        cancel: CancellationToken,
    ) -> Result<(), EnforceError>;

    async fn unload_plugin(&self, plugin_id: &str, cancel: CancellationToken)
        -> Result<(), EnforceError>;
}

/// Loads plugins only when policy allows.
pub struct PluginGuard<H> {
    host: H,
    enforcer: Enforcer,
}

impl<H: PluginHost> PluginGuard<H> {
    pub fn new(host: H, engine: Arc<PolicyEngine>, notifier: Arc<NotificationDispatcher>) -> Self {
        Self {
            host,
            enforcer: Enforcer::new(engine, notifier, PolicyCategory::Plugins),
        }
    }

    /// Evaluate a manifest without loading or auditing.
    pub fn check_plugin_policy(
        &self,
        manifest: &PluginManifest,
    ) -> Result<PolicyEvaluationResult, EnforceError> {
        Ok(self.enforcer.engine.evaluate_plugin(
            &manifest.id,
            manifest.author.as_deref(),
            Some(manifest.risk_level.unwrap_or(RiskLevel::Network)),
        )?)
    }

    pub async fn load_plugin(
        &self,
        manifest: &PluginManifest,
        instance: H::Instance,
        cancel: CancellationToken,
    ) -> Result<Outcome<()>, EnforceError> {
        let result = self.check_plugin_policy(manifest)?;
        let decision = match self.enforcer.gate(&manifest.id, "load", result) {
            Ok(decision) => decision,
            Err(outcome) => return Ok(outcome),
        };

        self.host.load_plugin(manifest, instance, cancel).await?;
        tracing::info!(
            plugin_id = %manifest.id,
            version = %manifest.version,
            decision = %decision.decision(),
            "plugin loaded"
        );
        Ok(Outcome::Completed {
            output: (),
            decision,
        })
    }

    /// Unload a plugin. Always permitted; the action is audited.
    pub async fn unload_plugin(
        &self,
        plugin_id: &str,
        cancel: CancellationToken,
    ) -> Result<(), EnforceError> {
        self.host.unload_plugin(plugin_id, cancel).await?;
        let entry = AuditEntry::new(
            PolicyCategory::Plugins,
            plugin_id,
            "unload",
            DecisionKind::Allow,
            "unloading is always permitted",
            PolicySource::Default,
        )
        .at(self.enforcer.now());
        self.enforcer.engine.record_audit(entry);
        tracing::info!(plugin_id, "plugin unloaded");
        Ok(())
    }

    /// Session grants for plugins.
    pub fn approvals(&self) -> &Approvals {
        &self.enforcer.approvals
    }

    pub fn host(&self) -> &H {
        &self.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use gov_policy::{PolicyDecision, PolicyDocument};

    #[derive(Default)]
    struct RecordingHost {
        loaded: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl PluginHost for RecordingHost {
        type Instance = String;

        async fn load_plugin(
            &self,
            manifest: &PluginManifest,
            instance: String,
            _cancel: CancellationToken,
        ) -> Result<(), EnforceError> {
            self.loaded
                .lock()
                .unwrap()
                .push((manifest.id.clone(), instance));
            Ok(())
        }

        async fn unload_plugin(
            &self,
            plugin_id: &str,
            _cancel: CancellationToken,
        ) -> Result<(), EnforceError> {
            self.loaded.lock().unwrap().retain(|(id, _)| id != plugin_id);
            Ok(())
        }
    }

    fn manifest(id: &str, author: Option<&str>, risk: Option<RiskLevel>) -> PluginManifest {
        PluginManifest {
            id: id.to_string(),
            name: id.to_string(),
            version: "1.0.0".to_string(),
            author: author.map(str::to_string),
            risk_level: risk,
        }
    }

    fn guard(json: &str) -> PluginGuard<RecordingHost> {
        let engine = Arc::new(PolicyEngine::new());
        let doc = PolicyDocument::from_json_str(json, PolicySource::Organization).unwrap();
        engine.set_document(PolicySource::Organization, doc).unwrap();
        PluginGuard::new(
            RecordingHost::default(),
            engine,
            Arc::new(NotificationDispatcher::new()),
        )
    }

    #[tokio::test]
    async fn risk_ceiling_beats_allow_list() {
        let guard = guard(r#"{"plugins":{"maxRiskLevel":"ReadOnly","allow":["weather"]}}"#);
        let outcome = guard
            .load_plugin(
                &manifest("weather", None, Some(RiskLevel::Network)),
                "handle".to_string(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(outcome.is_blocked());
        assert!(guard.host().loaded.lock().unwrap().is_empty());
    }

    #[test]
    fn undeclared_risk_is_treated_as_network() {
        let guard = guard(r#"{"plugins":{"maxRiskLevel":"LocalMutation","allow":["*"]}}"#);
        let result = guard
            .check_plugin_policy(&manifest("notes", None, None))
            .unwrap();
        assert!(result.is_denied());
    }

    #[tokio::test]
    async fn trusted_author_loads_and_unload_is_audited() {
        let guard = guard(r#"{"plugins":{"trustedAuthors":["acme"]}}"#);
        let outcome = guard
            .load_plugin(
                &manifest("acme.notes", Some("acme"), Some(RiskLevel::ReadOnly)),
                "handle".to_string(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(outcome.is_completed());
        assert_eq!(guard.host().loaded.lock().unwrap().len(), 1);

        guard
            .unload_plugin("acme.notes", CancellationToken::new())
            .await
            .unwrap();
        assert!(guard.host().loaded.lock().unwrap().is_empty());
        let entries = guard.enforcer.engine.audit_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].action, "unload");
        assert_eq!(entries[1].decision, DecisionKind::Allow);
    }

    #[tokio::test]
    async fn unknown_plugin_needs_approval_by_default() {
        let guard = guard("{}");
        let m = manifest("random", None, Some(RiskLevel::ReadOnly));
        let result = guard.check_plugin_policy(&m).unwrap();
        assert_eq!(result.decision(), &PolicyDecision::AllowWithApproval);

        guard.approvals().grant("random", "operator").unwrap();
        let outcome = guard
            .load_plugin(&m, "handle".to_string(), CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.is_completed());
        assert_eq!(outcome.decision().unwrap().source(), PolicySource::Session);
    }
}
