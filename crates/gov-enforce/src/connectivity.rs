// connectivity.rs — Policy-gated network access and connectivity modes.
//
// A request is checked in this order:
//
// 1. current mode no longer allowed      → Deny
// 2. Offline                             → Deny
// 3. LocalNetwork and host is not local  → Deny
// 4. telemetry-looking request while allowTelemetry is off → Deny
// 5. the engine's domain evaluation (blocklist, then allow-list)
//
// Mode changes are checked separately; moving to a more permissive mode needs
// approval (grant subject "mode:<name>"). Until the session changes the mode,
// the current mode follows the merged policy default, so a policy loaded after
// the guard was built still takes effect.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::{Host, Url};

use gov_policy::{
    ConnectivityMode, MatchStep, MergedConnectivitySettings, PolicyCategory, PolicyDecision,
    PolicyEngine, PolicyEvaluationResult, PolicySource,
};

use crate::error::EnforceError;
use crate::guard::{Approvals, Enforcer, Outcome};
use crate::notify::NotificationDispatcher;

/// Substrings that mark a request as telemetry.
pub const TELEMETRY_KEYWORDS: [&str; 6] = [
    "telemetry",
    "analytics",
    "tracking",
    "metrics",
    "crash-report",
    "beacon",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkResponse {
    pub status: u16,
    #[serde(default)]
    pub body: String,
}

/// The wrapped network client.
#[async_trait]
pub trait ConnectivityGateway: Send + Sync {
    async fn send_request(
        &self,
        endpoint: &Url,
        method: &str,
        intent: &str,
        cancel: CancellationToken,
    ) -> Result<NetworkResponse, EnforceError>;
}

/// Sends requests only when policy and the current mode allow.
pub struct ConnectivityGuard<G> {
    gateway: G,
    enforcer: Enforcer,
    /// Mode chosen by a session change; None follows the policy default.
    session_mode: Mutex<Option<ConnectivityMode>>,
}

impl<G: ConnectivityGateway> ConnectivityGuard<G> {
    /// Starts in the merged default mode.
    pub fn new(gateway: G, engine: Arc<PolicyEngine>, notifier: Arc<NotificationDispatcher>) -> Self {
        Self {
            gateway,
            enforcer: Enforcer::new(engine, notifier, PolicyCategory::Connectivity),
            session_mode: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> MergedConnectivitySettings {
        self.enforcer.engine.evaluate_connectivity_policy()
    }

    pub fn current_mode(&self) -> ConnectivityMode {
        self.mode_in(&self.settings()).0
    }

    /// Where the current mode comes from: Session after a change, otherwise
    /// the source that stated the default (or Default).
    pub fn mode_source(&self) -> PolicySource {
        self.mode_in(&self.settings()).1
    }

    fn mode_in(&self, settings: &MergedConnectivitySettings) -> (ConnectivityMode, PolicySource) {
        match *self.lock_mode() {
            Some(mode) => (mode, PolicySource::Session),
            None => (settings.default_mode, settings.source_of("defaultMode")),
        }
    }

    /// Whether a request to `endpoint` would be allowed. Not audited.
    pub fn check_request(
        &self,
        endpoint: &Url,
        intent: &str,
    ) -> Result<PolicyEvaluationResult, EnforceError> {
        let host = host_of(endpoint)?;
        let settings = self.settings();
        let (mode, mode_source) = self.mode_in(&settings);

        if !settings.is_mode_allowed(mode) {
            return Ok(self.deny(
                format!("connectivity mode {} is not allowed by policy", mode),
                settings.source_of("allowedModes"),
            ));
        }
        match mode {
            ConnectivityMode::Offline => {
                return Ok(self.deny(
                    format!("offline mode: request to '{}' blocked", host),
                    mode_source,
                ));
            }
            ConnectivityMode::LocalNetwork if !endpoint.host().is_some_and(|h| is_local_host(&h)) => {
                return Ok(self.deny(
                    format!("local-network mode: '{}' is not a local host", host),
                    mode_source,
                ));
            }
            _ => {}
        }
        if !settings.allow_telemetry && is_telemetry(endpoint, intent) {
            return Ok(self.deny(
                format!("telemetry to '{}' is not allowed", host),
                settings.source_of("allowTelemetry"),
            ));
        }
        Ok(self.enforcer.engine.evaluate_domain(&host)?)
    }

    /// Check and send a request. `endpoint` must be an absolute URL with a host.
    pub async fn send_request(
        &self,
        endpoint: &str,
        method: &str,
        intent: &str,
        cancel: CancellationToken,
    ) -> Result<Outcome<NetworkResponse>, EnforceError> {
        let url = Url::parse(endpoint).map_err(|e| EnforceError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })?;
        let result = self.check_request(&url, intent)?;
        let host = host_of(&url)?;
        let decision = match self.enforcer.gate(&host, "request", result) {
            Ok(decision) => decision,
            Err(outcome) => return Ok(outcome),
        };

        tracing::debug!(host = %host, method, intent, "sending request");
        let response = self.gateway.send_request(&url, method, intent, cancel).await?;
        Ok(Outcome::Completed {
            output: response,
            decision,
        })
    }

    /// Whether switching to `mode` would be allowed. Not audited.
    pub fn check_mode_change(&self, mode: ConnectivityMode) -> PolicyEvaluationResult {
        let settings = self.settings();
        let (current, _) = self.mode_in(&settings);

        if mode == current {
            return self.enforcer.decide(
                PolicyDecision::Allow,
                format!("already in {} mode", mode),
                PolicySource::Default,
                MatchStep::BuiltInDefault,
            );
        }
        if !settings.allow_mode_change {
            return self.deny(
                "connectivity mode changes are disabled by policy".to_string(),
                settings.source_of("allowModeChange"),
            );
        }
        if !settings.is_mode_allowed(mode) {
            return self.deny(
                format!("connectivity mode {} is not allowed by policy", mode),
                settings.source_of("allowedModes"),
            );
        }
        if mode > current {
            let pending = self.enforcer.decide(
                PolicyDecision::AllowWithApproval,
                format!("switching from {} to {} widens network access", current, mode),
                PolicySource::Default,
                MatchStep::BuiltInDefault,
            );
            return self.enforcer.apply_grant(pending, &mode_subject(mode));
        }
        self.enforcer.decide(
            PolicyDecision::Allow,
            format!("switching to the more restrictive {} mode", mode),
            PolicySource::Default,
            MatchStep::BuiltInDefault,
        )
    }

    /// Switch modes when allowed. The output is the previous mode.
    pub fn set_mode(&self, mode: ConnectivityMode) -> Outcome<ConnectivityMode> {
        let result = self.check_mode_change(mode);
        let decision = match self.enforcer.gate(&mode_subject(mode), "set_mode", result) {
            Ok(decision) => decision,
            Err(outcome) => return outcome,
        };
        let settings = self.settings();
        let previous = {
            let mut session = self.lock_mode();
            let previous = session.unwrap_or(settings.default_mode);
            *session = Some(mode);
            previous
        };
        tracing::info!(from = %previous, to = %mode, "connectivity mode changed");
        Outcome::Completed {
            output: previous,
            decision,
        }
    }

    /// Session grants for domains and mode changes.
    pub fn approvals(&self) -> &Approvals {
        &self.enforcer.approvals
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    fn deny(&self, reason: String, source: PolicySource) -> PolicyEvaluationResult {
        self.enforcer
            .decide(PolicyDecision::Deny, reason, source, MatchStep::Setting)
    }

    fn lock_mode(&self) -> std::sync::MutexGuard<'_, Option<ConnectivityMode>> {
        self.session_mode.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Grant subject for switching to `mode`.
pub fn mode_subject(mode: ConnectivityMode) -> String {
    format!("mode:{}", mode)
}

fn host_of(endpoint: &Url) -> Result<String, EnforceError> {
    endpoint
        .host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
        .ok_or_else(|| EnforceError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "no host".to_string(),
        })
}

/// Loopback, private, link-local, or a `.local` name.
pub fn is_local_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(name) => {
            let name = name.trim_end_matches('.').to_ascii_lowercase();
            name == "localhost" || name.ends_with(".localhost") || name.ends_with(".local")
        }
        Host::Ipv4(ip) => is_local_v4(ip),
        Host::Ipv6(ip) => is_local_v6(ip),
    }
}

fn is_local_v4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local()
}

fn is_local_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    // fc00::/7 unique-local, fe80::/10 link-local
    ip.is_loopback() || (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

/// Heuristic: a telemetry keyword in the intent, host, or path.
pub fn is_telemetry(endpoint: &Url, intent: &str) -> bool {
    let intent = intent.to_ascii_lowercase();
    let target = format!(
        "{}{}",
        endpoint.host_str().unwrap_or_default(),
        endpoint.path()
    )
    .to_ascii_lowercase();
    TELEMETRY_KEYWORDS
        .iter()
        .any(|k| intent.contains(k) || target.contains(k))
}
