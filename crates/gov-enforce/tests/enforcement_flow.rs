// enforcement_flow.rs — Guards driven end-to-end against a real engine.
//
// Steps covered:
//   1. memory retention purges items past the window, keeps the rest
//   2. the count limit removes only the oldest excess items
//   3. connectivity: blocked domains, telemetry, offline mode, mode approval
//   4. updates: deferral is notified and recorded, critical updates bypass it
//   5. every guarded operation lands in the engine's audit log

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio_util::sync::CancellationToken;
use url::Url;

use gov_enforce::{
    ConnectivityGateway, ConnectivityGuard, EnforceError, EnforcementEvent, MemoryGuard,
    MemoryItem, MemorySink, NetworkResponse, NotificationDispatcher, PurgeReason, UpdateGuard,
    UpdateInfo, UpdateManager, VecMemoryStore,
};
use gov_policy::{
    ConnectivityMode, DecisionKind, FixedClock, PolicyCategory, PolicyDocument, PolicyEngine,
    PolicySource, UpdateChannel,
};

fn now() -> DateTime<Utc> {
    "2026-03-15T09:30:00Z".parse().unwrap()
}

fn engine(docs: &[(PolicySource, &str)]) -> Arc<PolicyEngine> {
    let engine = Arc::new(PolicyEngine::with_clock(Arc::new(FixedClock::new(now()))));
    for (source, json) in docs {
        let doc = PolicyDocument::from_json_str(json, *source).unwrap();
        engine.set_document(*source, doc).unwrap();
    }
    engine
}

fn notifier() -> (Arc<NotificationDispatcher>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let dispatcher = NotificationDispatcher::new().with_sink(sink.clone());
    (Arc::new(dispatcher), sink)
}

// ── Memory ─────────────────────────────────────────────────────

fn memory(age_days: i64, id: &str) -> MemoryItem {
    MemoryItem::new(id, "notes", "remember this", now() - Duration::days(age_days))
}

#[test]
fn retention_purges_only_expired_items() {
    let engine = engine(&[(
        PolicySource::Organization,
        r#"{"memory":{"maxRetentionDays":30}}"#,
    )]);
    let (notifier, sink) = notifier();
    let guard = MemoryGuard::new(VecMemoryStore::new(), engine.clone(), notifier);

    assert!(guard.add(memory(31, "old")).unwrap().is_completed());
    assert!(guard.add(memory(29, "recent")).unwrap().is_completed());

    assert_eq!(guard.apply_retention().unwrap(), 1);
    assert_eq!(guard.store().len(), 1);

    let events = sink.events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        EnforcementEvent::Purged { reason, count, .. } => {
            assert_eq!(*reason, PurgeReason::Retention);
            assert_eq!(*count, 1);
        }
        other => panic!("expected a purge event, got {other:?}"),
    }

    // A second pass has nothing left to purge and stays quiet.
    assert_eq!(guard.apply_retention().unwrap(), 0);
    assert_eq!(sink.events().len(), 1);
}

#[test]
fn count_limit_removes_the_oldest() {
    let engine = engine(&[(PolicySource::Team, r#"{"memory":{"maxMemories":2}}"#)]);
    let (notifier, sink) = notifier();
    let guard = MemoryGuard::new(VecMemoryStore::new(), engine, notifier);

    for (age, id) in [(5, "middle"), (10, "oldest"), (1, "newest")] {
        guard.add(memory(age, id)).unwrap();
    }
    assert_eq!(guard.enforce_count_limit().unwrap(), 1);

    let mut left: Vec<String> = guard
        .export()
        .unwrap()
        .into_output()
        .unwrap()
        .into_iter()
        .map(|m| m.id)
        .collect();
    left.sort();
    assert_eq!(left, vec!["middle", "newest"]);
    assert!(matches!(
        sink.events()[0],
        EnforcementEvent::Purged {
            reason: PurgeReason::CountLimit,
            count: 1,
            ..
        }
    ));
}

#[test]
fn user_cannot_lift_organization_exclusion() {
    let engine = engine(&[
        (
            PolicySource::Organization,
            r#"{"memory":{"excludeCategories":["credentials"]}}"#,
        ),
        (PolicySource::User, r#"{"memory":{"excludeCategories":[]}}"#),
    ]);
    let (notifier, _) = notifier();
    let guard = MemoryGuard::new(VecMemoryStore::new(), engine, notifier);
    let item = MemoryItem::new("k", "Credentials", "hunter2", now());
    let outcome = guard.add(item).unwrap();
    assert!(outcome.is_blocked());
    assert_eq!(
        outcome.decision().unwrap().source(),
        PolicySource::Organization
    );
}

// ── Connectivity ───────────────────────────────────────────────

#[derive(Default)]
struct RecordingGateway {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl ConnectivityGateway for RecordingGateway {
    async fn send_request(
        &self,
        endpoint: &Url,
        _method: &str,
        _intent: &str,
        _cancel: CancellationToken,
    ) -> Result<NetworkResponse, EnforceError> {
        self.sent.lock().unwrap().push(endpoint.to_string());
        Ok(NetworkResponse {
            status: 200,
            body: "ok".to_string(),
        })
    }
}

async fn send(
    guard: &ConnectivityGuard<RecordingGateway>,
    endpoint: &str,
    intent: &str,
) -> gov_enforce::Outcome<NetworkResponse> {
    guard
        .send_request(endpoint, "GET", intent, CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn blocked_domains_and_telemetry_never_reach_the_gateway() {
    let engine = engine(&[
        (
            PolicySource::Organization,
            r#"{"connectivity":{"blockedDomains":["tracker.io"]}}"#,
        ),
        (
            PolicySource::User,
            r#"{"connectivity":{"blockedDomains":["evil.com"]}}"#,
        ),
    ]);
    let (notifier, sink) = notifier();
    let guard = ConnectivityGuard::new(RecordingGateway::default(), engine, notifier);

    assert!(send(&guard, "https://cdn.tracker.io/x.js", "load script")
        .await
        .is_blocked());
    assert!(send(&guard, "https://evil.com/", "browse").await.is_blocked());
    assert!(send(&guard, "https://api.example.com/v1/events", "usage analytics")
        .await
        .is_blocked());

    let ok = send(&guard, "https://docs.rs/serde", "fetch docs").await;
    assert!(ok.is_completed());
    assert_eq!(ok.output().unwrap().status, 200);

    assert_eq!(guard.gateway().sent.lock().unwrap().len(), 1);
    assert_eq!(sink.events().len(), 3);
}

#[tokio::test]
async fn telemetry_is_blocked_with_no_policy_loaded() {
    let engine = engine(&[]);
    let (notifier, sink) = notifier();
    let guard = ConnectivityGuard::new(RecordingGateway::default(), engine, notifier);

    assert!(!guard.settings().allow_telemetry);
    assert!(send(&guard, "https://example.com/metrics", "upload").await.is_blocked());
    assert!(send(&guard, "https://example.com/", "usage tracking").await.is_blocked());
    assert!(send(&guard, "https://example.com/", "browse").await.is_completed());

    assert_eq!(guard.gateway().sent.lock().unwrap().len(), 1);
    assert_eq!(sink.events().len(), 2);
}

#[tokio::test]
async fn telemetry_allowed_when_policy_says_so() {
    let engine = engine(&[(
        PolicySource::Organization,
        r#"{"connectivity":{"allowTelemetry":true}}"#,
    )]);
    let (notifier, _) = notifier();
    let guard = ConnectivityGuard::new(RecordingGateway::default(), engine, notifier);
    assert!(send(&guard, "https://metrics.example.com/", "crash-report upload")
        .await
        .is_completed());
}

#[tokio::test]
async fn offline_default_and_mode_approval() {
    let engine = engine(&[(
        PolicySource::Organization,
        r#"{"connectivity":{"defaultMode":"Offline"}}"#,
    )]);
    let (notifier, sink) = notifier();
    let guard = ConnectivityGuard::new(RecordingGateway::default(), engine, notifier);
    assert_eq!(guard.current_mode(), ConnectivityMode::Offline);
    assert!(send(&guard, "https://docs.rs/", "fetch").await.is_blocked());

    // Widening access needs approval until a grant exists.
    assert!(guard.set_mode(ConnectivityMode::LocalNetwork).requires_approval());
    assert_eq!(
        sink.events().last().map(|e| e.event_type().to_string()),
        Some("approval_required".to_string())
    );
    guard
        .approvals()
        .grant("mode:LocalNetwork", "operator")
        .unwrap();
    let changed = guard.set_mode(ConnectivityMode::LocalNetwork);
    assert_eq!(changed.output(), Some(&ConnectivityMode::Offline));

    assert!(send(&guard, "http://192.168.1.10/status", "poll").await.is_completed());
    assert!(send(&guard, "https://docs.rs/", "fetch").await.is_blocked());

    // Narrowing access is always fine.
    assert!(guard.set_mode(ConnectivityMode::Offline).is_completed());
}

#[tokio::test]
async fn mode_follows_policy_until_the_session_changes_it() {
    let engine = engine(&[]);
    let (notifier, _) = notifier();
    let guard = ConnectivityGuard::new(RecordingGateway::default(), engine.clone(), notifier);
    assert_eq!(guard.current_mode(), ConnectivityMode::Online);
    assert_eq!(guard.mode_source(), PolicySource::Default);

    // A policy loaded after the guard was built still sets the mode.
    let org = PolicyDocument::from_json_str(
        r#"{"connectivity":{"defaultMode":"Offline"}}"#,
        PolicySource::Organization,
    )
    .unwrap();
    engine.set_document(PolicySource::Organization, org).unwrap();
    assert_eq!(guard.current_mode(), ConnectivityMode::Offline);
    assert_eq!(guard.mode_source(), PolicySource::Organization);
    assert!(send(&guard, "https://docs.rs/", "fetch").await.is_blocked());

    guard.approvals().grant("mode:Online", "operator").unwrap();
    assert!(guard.set_mode(ConnectivityMode::Online).is_completed());
    assert_eq!(guard.mode_source(), PolicySource::Session);

    // Once the session has chosen, a new policy default no longer moves it.
    let team = PolicyDocument::from_json_str(
        r#"{"connectivity":{"defaultMode":"LocalNetwork"}}"#,
        PolicySource::Team,
    )
    .unwrap();
    engine.set_document(PolicySource::Team, team).unwrap();
    assert_eq!(guard.current_mode(), ConnectivityMode::Online);
    assert!(send(&guard, "https://docs.rs/", "fetch").await.is_completed());
}

#[tokio::test]
async fn locked_mode_cannot_change() {
    let engine = engine(&[(
        PolicySource::Organization,
        r#"{"connectivity":{"allowedModes":["Offline","LocalNetwork"],"allowModeChange":false}}"#,
    )]);
    let (notifier, _) = notifier();
    let guard = ConnectivityGuard::new(RecordingGateway::default(), engine, notifier);
    assert_eq!(guard.current_mode(), ConnectivityMode::LocalNetwork);
    let outcome = guard.set_mode(ConnectivityMode::Offline);
    assert!(outcome.is_blocked());
    assert!(outcome.reason().contains("disabled"));
}

#[tokio::test]
async fn malformed_endpoint_is_an_error() {
    let (notifier, _) = notifier();
    let guard = ConnectivityGuard::new(RecordingGateway::default(), engine(&[]), notifier);
    let err = guard
        .send_request("not a url", "GET", "fetch", CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EnforceError::InvalidEndpoint { .. }));
}

// ── Updates ────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingUpdater {
    installed: Mutex<Vec<String>>,
}

#[async_trait]
impl UpdateManager for RecordingUpdater {
    async fn check_for_update(
        &self,
        _cancel: CancellationToken,
    ) -> Result<Option<UpdateInfo>, EnforceError> {
        Ok(Some(UpdateInfo {
            version: "9.9.9".to_string(),
            channel: UpdateChannel::Stable,
            released_at: now(),
            critical: false,
        }))
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
        update: &UpdateInfo,
        _cancel: CancellationToken,
    ) -> Result<(), EnforceError> {
        self.installed.lock().unwrap().push(update.version.clone());
        Ok(())
    }
}

#[tokio::test]
async fn deferred_install_is_notified_and_critical_bypasses() {
    let engine = engine(&[(
        PolicySource::Organization,
        r#"{"updates":{"deferDays":14,"allowedChannels":["Stable"]}}"#,
    )]);
    let (notifier, sink) = notifier();
    let guard = UpdateGuard::new(RecordingUpdater::default(), engine.clone(), notifier);

    let fresh = UpdateInfo {
        version: "2.4.0".to_string(),
        channel: UpdateChannel::Stable,
        released_at: now() - Duration::days(2),
        critical: false,
    };
    let outcome = guard.install(&fresh, CancellationToken::new()).await.unwrap();
    assert!(outcome.is_deferred());
    assert!(matches!(
        &sink.events()[0],
        EnforcementEvent::Deferred { version, .. } if version == "2.4.0"
    ));

    let critical = UpdateInfo {
        critical: true,
        ..fresh.clone()
    };
    assert!(guard
        .install(&critical, CancellationToken::new())
        .await
        .unwrap()
        .is_completed());

    let nightly = UpdateInfo {
        channel: UpdateChannel::Nightly,
        released_at: now() - Duration::days(30),
        ..fresh
    };
    assert!(guard
        .install(&nightly, CancellationToken::new())
        .await
        .unwrap()
        .is_blocked());

    assert_eq!(*guard.manager().installed.lock().unwrap(), vec!["2.4.0"]);

    let entries = engine.audit_entries();
    assert_eq!(entries.len(), 3);
    assert!(entries.iter().all(|e| e.category == PolicyCategory::Updates));
    assert_eq!(entries[0].decision, DecisionKind::Deny);
    assert_eq!(entries[1].decision, DecisionKind::Allow);
}

#[tokio::test]
async fn startup_check_respects_policy() {
    let off = engine(&[(
        PolicySource::User,
        r#"{"updates":{"checkOnStartup":false}}"#,
    )]);
    let (notifier, _) = notifier();
    let guard = UpdateGuard::new(RecordingUpdater::default(), off, notifier.clone());
    assert!(guard
        .startup_check(CancellationToken::new())
        .await
        .unwrap()
        .is_none());

    let on = UpdateGuard::new(RecordingUpdater::default(), engine(&[]), notifier);
    assert!(on
        .startup_check(CancellationToken::new())
        .await
        .unwrap()
        .is_some());
}
