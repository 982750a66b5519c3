// document.rs — Policy document data model.
//
// One PolicyDocument per source (organization, team, user, session). The
// JSON representation uses camelCase keys:
//
// ```json
// {
//   "version": "1.0",
//   "locked": true,
//   "tools": { "default": "Deny", "allow": ["fs.*"], "deny": ["exec.*"] },
//   "connectivity": { "blockedDomains": ["tracker.io"] }
// }
// ```
//
// Settings fields are `Option`s: `None` means "this source says nothing",
// which the settings merge must distinguish from an explicit value.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::condition::RuleConditions;
use crate::decision::{Constraint, DecisionKind};

/// Schema version written by this crate.
pub const CURRENT_SCHEMA_VERSION: &str = "1.0";

/// A complete policy file for one source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDocument {
    #[serde(default = "default_version")]
    pub version: String,

    /// Organization-only: when true, the document's stated category defaults
    /// are authoritative when none of its rules match.
    #[serde(default)]
    pub locked: bool,

    #[serde(default)]
    pub tools: ToolPolicy,
    #[serde(default)]
    pub plugins: PluginPolicy,
    #[serde(default)]
    pub memory: MemoryPolicy,
    #[serde(default)]
    pub connectivity: ConnectivityPolicy,
    #[serde(default)]
    pub updates: UpdatePolicy,
}

fn default_version() -> String {
    CURRENT_SCHEMA_VERSION.to_string()
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self {
            version: default_version(),
            locked: false,
            tools: ToolPolicy::default(),
            plugins: PluginPolicy::default(),
            memory: MemoryPolicy::default(),
            connectivity: ConnectivityPolicy::default(),
            updates: UpdatePolicy::default(),
        }
    }
}

impl PolicyDocument {
    /// Parse and validate a JSON string.
    pub fn from_json_str(
        json: &str,
        source: crate::PolicySource,
    ) -> Result<Self, crate::PolicyError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        crate::validate::parse_document(&value, source)
    }

    pub fn to_json_pretty(&self) -> Result<String, crate::PolicyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Tool rule-set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolPolicy {
    /// Category default. Authoritative only in a locked Organization document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DecisionKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub require_approval: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<ToolRule>,
}

/// A detailed tool rule. First pattern+condition match wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolRule {
    pub id: String,
    /// Tool id pattern (exact or `*` glob).
    pub tool: String,
    pub decision: DecisionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<RuleConditions>,
}

/// Declared plugin capability tier, ordered from least to most capable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RiskLevel {
    ReadOnly,
    LocalMutation,
    Network,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [
        RiskLevel::ReadOnly,
        RiskLevel::LocalMutation,
        RiskLevel::Network,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::ReadOnly => "ReadOnly",
            RiskLevel::LocalMutation => "LocalMutation",
            RiskLevel::Network => "Network",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plugin rule-set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PluginPolicy {
    /// `Some(false)` denies every plugin at this source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_risk_level: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DecisionKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub require_approval: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trusted_authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<PluginRule>,
}

/// A detailed plugin rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PluginRule {
    pub id: String,
    /// Plugin id pattern (exact or `*` glob).
    pub plugin: String,
    pub decision: DecisionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Constraint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<RuleConditions>,
}

/// Memory settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// 0–365. Zero means no retention limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retention_days: Option<u32>,
    /// Zero means no count limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memories: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypt_at_rest: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_formation: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_categories: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_export: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_import: Option<bool>,
}

/// How much network access the host application has.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConnectivityMode {
    Offline,
    LocalNetwork,
    Online,
}

impl ConnectivityMode {
    pub const ALL: [ConnectivityMode; 3] = [
        ConnectivityMode::Offline,
        ConnectivityMode::LocalNetwork,
        ConnectivityMode::Online,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectivityMode::Offline => "Offline",
            ConnectivityMode::LocalNetwork => "LocalNetwork",
            ConnectivityMode::Online => "Online",
        }
    }
}

impl fmt::Display for ConnectivityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connectivity settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityPolicy {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_modes: Vec<ConnectivityMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_mode: Option<ConnectivityMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_mode_change: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked_domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_telemetry: Option<bool>,
}

/// Software update channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpdateChannel {
    Stable,
    Beta,
    Nightly,
}

impl UpdateChannel {
    pub const ALL: [UpdateChannel; 3] = [
        UpdateChannel::Stable,
        UpdateChannel::Beta,
        UpdateChannel::Nightly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UpdateChannel::Stable => "Stable",
            UpdateChannel::Beta => "Beta",
            UpdateChannel::Nightly => "Nightly",
        }
    }
}

impl fmt::Display for UpdateChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Update settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_update: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_channels: Vec<UpdateChannel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_channel: Option<UpdateChannel>,
    /// 0–365. Zero means no deferral.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defer_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_on_startup: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_version: Option<String>,
}
