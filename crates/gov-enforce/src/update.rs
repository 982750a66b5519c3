// update.rs — Policy-gated software updates.
//
// An offered update is checked in this order:
//
// 1. channel not compliant (required channel first, else allowed list) → Deny
// 2. version below minimumVersion                                      → Deny
// 3. released less than deferDays ago and not critical                 → Deferred
// 4. autoUpdate off → AllowWithApproval (grant subject = the version string)
// 5. otherwise                                                         → Allow
//
// Download and install go through the same check.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use gov_policy::{
    AuditEntry, DecisionKind, MatchStep, MergedUpdateSettings, PolicyCategory, PolicyDecision,
    PolicyEngine, PolicyEvaluationResult, PolicySource, UpdateChannel, Version,
};

use crate::error::EnforceError;
use crate::guard::{Approvals, Enforcer, Outcome};
use crate::notify::{EnforcementEvent, NotificationDispatcher};

/// An update offered by the update service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    pub version: String,
    pub channel: UpdateChannel,
    pub released_at: DateTime<Utc>,
    /// Critical (security) updates bypass the deferral window.
    #[serde(default)]
    pub critical: bool,
}

/// The wrapped updater.
#[async_trait]
pub trait UpdateManager: Send + Sync {
    async fn check_for_update(
        &self,
        cancel: CancellationToken,
    ) -> Result<Option<UpdateInfo>, EnforceError>;

    async fn download(&self, update: &UpdateInfo, cancel: CancellationToken)
        -> Result<(), EnforceError>;

    async fn install(&self, update: &UpdateInfo, cancel: CancellationToken)
        -> Result<(), EnforceError>;
}

/// Result of checking an update against policy.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateVerdict {
    Evaluated(PolicyEvaluationResult),
    /// Inside the deferral window.
    Deferred {
        until: DateTime<Utc>,
        reason: String,
        source: PolicySource,
    },
}

/// Downloads and installs updates only when policy allows.
pub struct UpdateGuard<M> {
    manager: M,
    enforcer: Enforcer,
}

impl<M: UpdateManager> UpdateGuard<M> {
    pub fn new(manager: M, engine: Arc<PolicyEngine>, notifier: Arc<NotificationDispatcher>) -> Self {
        Self {
            manager,
            enforcer: Enforcer::new(engine, notifier, PolicyCategory::Updates),
        }
    }

    pub fn settings(&self) -> MergedUpdateSettings {
        self.enforcer.engine.evaluate_update_policy()
    }

    /// Check an update against policy. Not audited.
    pub fn check_update_policy(&self, update: &UpdateInfo) -> Result<UpdateVerdict, EnforceError> {
        let settings = self.settings();
        let now = self.enforcer.now();

        if !settings.is_channel_compliant(update.channel) {
            let (field, reason) = match settings.required_channel {
                Some(required) => (
                    "requiredChannel",
                    format!("channel {} is required; update is on {}", required, update.channel),
                ),
                None => (
                    "allowedChannels",
                    format!("channel {} is not allowed by policy", update.channel),
                ),
            };
            return Ok(UpdateVerdict::Evaluated(self.deny(reason, settings.source_of(field))));
        }

        let version = Version::parse(&update.version)
            .ok_or_else(|| EnforceError::InvalidVersion(update.version.clone()))?;
        if let Some(minimum) = settings.minimum_version.as_deref().and_then(Version::parse) {
            if version < minimum {
                return Ok(UpdateVerdict::Evaluated(self.deny(
                    format!("version {} is below the minimum {}", version, minimum),
                    settings.source_of("minimumVersion"),
                )));
            }
        }

        if !update.critical && settings.defer_days > 0 {
            let until = update.released_at + Duration::days(i64::from(settings.defer_days));
            if until > now {
                return Ok(UpdateVerdict::Deferred {
                    until,
                    reason: format!(
                        "version {} is deferred for {} days after release",
                        update.version, settings.defer_days
                    ),
                    source: settings.source_of("deferDays"),
                });
            }
        }

        if !settings.auto_update {
            let pending = self.enforcer.decide(
                PolicyDecision::AllowWithApproval,
                format!("automatic updates are off; version {} needs approval", update.version),
                settings.source_of("autoUpdate"),
                MatchStep::Setting,
            );
            return Ok(UpdateVerdict::Evaluated(
                self.enforcer.apply_grant(pending, &update.version),
            ));
        }

        Ok(UpdateVerdict::Evaluated(self.enforcer.decide(
            PolicyDecision::Allow,
            format!("version {} on {} complies with update policy", update.version, update.channel),
            PolicySource::Default,
            MatchStep::BuiltInDefault,
        )))
    }

    /// Ask the updater for an available update. Checking is never gated.
    pub async fn check_for_update(
        &self,
        cancel: CancellationToken,
    ) -> Result<Option<UpdateInfo>, EnforceError> {
        self.manager.check_for_update(cancel).await
    }

    /// Check at application startup, unless `checkOnStartup` is off.
    pub async fn startup_check(
        &self,
        cancel: CancellationToken,
    ) -> Result<Option<UpdateInfo>, EnforceError> {
        if !self.settings().check_on_startup {
            tracing::debug!("startup update check disabled by policy");
            return Ok(None);
        }
        self.check_for_update(cancel).await
    }

    pub async fn download(
        &self,
        update: &UpdateInfo,
        cancel: CancellationToken,
    ) -> Result<Outcome<()>, EnforceError> {
        let decision = match self.admit(update, "download")? {
            Ok(decision) => decision,
            Err(outcome) => return Ok(outcome),
        };
        self.manager.download(update, cancel).await?;
        Ok(Outcome::Completed {
            output: (),
            decision,
        })
    }

    pub async fn install(
        &self,
        update: &UpdateInfo,
        cancel: CancellationToken,
    ) -> Result<Outcome<()>, EnforceError> {
        let decision = match self.admit(update, "install")? {
            Ok(decision) => decision,
            Err(outcome) => return Ok(outcome),
        };
        self.manager.install(update, cancel).await?;
        tracing::info!(version = %update.version, channel = %update.channel, "update installed");
        Ok(Outcome::Completed {
            output: (),
            decision,
        })
    }

    /// Session grants for update versions.
    pub fn approvals(&self) -> &Approvals {
        &self.enforcer.approvals
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    /// Run the check and record it. The inner `Ok` means proceed.
    fn admit(
        &self,
        update: &UpdateInfo,
        action: &str,
    ) -> Result<Result<PolicyEvaluationResult, Outcome<()>>, EnforceError> {
        match self.check_update_policy(update)? {
            UpdateVerdict::Evaluated(result) => Ok(self.enforcer.gate(&update.version, action, result)),
            UpdateVerdict::Deferred {
                until,
                reason,
                source,
            } => {
                let entry = AuditEntry::new(
                    PolicyCategory::Updates,
                    &update.version,
                    action,
                    DecisionKind::Deny,
                    reason.clone(),
                    source,
                )
                .at(self.enforcer.now());
                self.enforcer.engine.record_audit(entry);
                self.enforcer.notify(EnforcementEvent::Deferred {
                    version: update.version.clone(),
                    until,
                    timestamp: self.enforcer.now(),
                });
                Ok(Err(Outcome::Deferred { until, reason }))
            }
        }
    }

    fn deny(&self, reason: String, source: PolicySource) -> PolicyEvaluationResult {
        self.enforcer
            .decide(PolicyDecision::Deny, reason, source, MatchStep::Setting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gov_policy::{FixedClock, PolicyDocument};

    struct NoopManager;

    #[async_trait]
    impl UpdateManager for NoopManager {
        async fn check_for_update(
            &self,
            _cancel: CancellationToken,
        ) -> Result<Option<UpdateInfo>, EnforceError> {
            Ok(None)
        }

        async fn download(
            &self,
            _update: &UpdateInfo,
            _cancel: CancellationToken,
        ) -> Result<(), EnforceError> {
            Ok(())
        }

        async fn install(
            &self,
            _update: &UpdateInfo,
            _cancel: CancellationToken,
        ) -> Result<(), EnforceError> {
            Ok(())
        }
    }

    fn now() -> DateTime<Utc> {
        "2026-06-10T00:00:00Z".parse().unwrap()
    }

    fn guard(json: &str) -> UpdateGuard<NoopManager> {
        let engine = Arc::new(PolicyEngine::with_clock(Arc::new(FixedClock::new(now()))));
        let doc = PolicyDocument::from_json_str(json, PolicySource::Organization).unwrap();
        engine.set_document(PolicySource::Organization, doc).unwrap();
        UpdateGuard::new(NoopManager, engine, Arc::new(NotificationDispatcher::new()))
    }

    fn update(version: &str, channel: UpdateChannel, age_days: i64) -> UpdateInfo {
        UpdateInfo {
            version: version.to_string(),
            channel,
            released_at: now() - Duration::days(age_days),
            critical: false,
        }
    }

    fn evaluated(verdict: UpdateVerdict) -> PolicyEvaluationResult {
        match verdict {
            UpdateVerdict::Evaluated(result) => result,
            other => panic!("expected an evaluation, got {other:?}"),
        }
    }

    #[test]
    fn required_channel_wins_over_allowed_list() {
        let guard = guard(
            r#"{"updates":{"requiredChannel":"Stable","allowedChannels":["Stable","Beta"]}}"#,
        );
        let beta = evaluated(
            guard
                .check_update_policy(&update("2.0.0", UpdateChannel::Beta, 30))
                .unwrap(),
        );
        assert!(beta.is_denied());
        assert!(beta.reason().contains("required"));
    }

    #[test]
    fn below_minimum_is_denied() {
        let guard = guard(r#"{"updates":{"minimumVersion":"2.1.0"}}"#);
        let old = evaluated(
            guard
                .check_update_policy(&update("2.0.9", UpdateChannel::Stable, 30))
                .unwrap(),
        );
        assert!(old.is_denied());
        assert_eq!(old.source(), PolicySource::Organization);
    }

    #[test]
    fn invalid_version_is_an_error() {
        let guard = guard("{}");
        assert!(matches!(
            guard.check_update_policy(&update("latest", UpdateChannel::Stable, 0)),
            Err(EnforceError::InvalidVersion(_))
        ));
    }

    #[test]
    fn deferral_and_critical_bypass() {
        let guard = guard(r#"{"updates":{"deferDays":7}}"#);
        let fresh = update("2.0.0", UpdateChannel::Stable, 3);
        match guard.check_update_policy(&fresh).unwrap() {
            UpdateVerdict::Deferred { until, .. } => {
                assert_eq!(until, fresh.released_at + Duration::days(7))
            }
            other => panic!("expected deferral, got {other:?}"),
        }

        let critical = UpdateInfo {
            critical: true,
            ..fresh
        };
        assert!(evaluated(guard.check_update_policy(&critical).unwrap()).is_allowed());

        let settled = update("2.0.0", UpdateChannel::Stable, 8);
        assert!(evaluated(guard.check_update_policy(&settled).unwrap()).is_allowed());
    }

    #[test]
    fn manual_updates_need_approval_per_version() {
        let guard = guard(r#"{"updates":{"autoUpdate":false}}"#);
        let offered = update("3.0.0", UpdateChannel::Stable, 1);
        assert!(evaluated(guard.check_update_policy(&offered).unwrap()).requires_approval());
        guard.approvals().grant("3.0.0", "admin").unwrap();
        let approved = evaluated(guard.check_update_policy(&offered).unwrap());
        assert!(approved.is_allowed());
        assert_eq!(approved.source(), PolicySource::Session);
    }
}
