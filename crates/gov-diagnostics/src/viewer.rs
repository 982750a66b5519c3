// viewer.rs — Read-only projections of an engine's policy state.
//
// Nothing here mutates the engine. Each view is a plain serializable value
// so hosts can render it however they like; `export_text` and `export_json`
// are the two built-in renderings of the effective policy.

use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use gov_policy::{
    MergedConnectivitySettings, MergedMemorySettings, MergedUpdateSettings, PolicyDocument,
    PolicyEngine, PolicyEvaluationResult, PolicySource, RiskLevel, SessionGrant,
};

use crate::error::DiagnosticsError;
use crate::explain::{explain, Explanation};

/// One loaded source in the status summary.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceStatus {
    pub source: PolicySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub version: String,
    pub locked: bool,
    pub loaded_at: DateTime<Utc>,
}

/// At-a-glance engine status.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusSummary {
    pub sources: Vec<SourceStatus>,
    pub grants: usize,
    pub audit_entries: usize,
    pub tracing: bool,
}

impl StatusSummary {
    pub fn is_loaded(&self, source: PolicySource) -> bool {
        self.sources.iter().any(|s| s.source == source)
    }
}

pub fn status(engine: &PolicyEngine) -> StatusSummary {
    let sources = engine
        .documents()
        .into_iter()
        .map(|loaded| SourceStatus {
            source: loaded.source,
            path: loaded.path,
            version: loaded.document.version,
            locked: loaded.document.locked,
            loaded_at: loaded.loaded_at,
        })
        .collect();
    StatusSummary {
        sources,
        grants: engine.grants(None).len(),
        audit_entries: engine.audit_len(),
        tracing: engine.is_tracing(),
    }
}

/// The raw document of one source.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SourceView {
    pub source: PolicySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub loaded_at: DateTime<Utc>,
    pub document: PolicyDocument,
}

/// None when the source has no document.
pub fn source_view(engine: &PolicyEngine, source: PolicySource) -> Option<SourceView> {
    engine.document(source).map(|loaded| SourceView {
        source: loaded.source,
        path: loaded.path,
        loaded_at: loaded.loaded_at,
        document: loaded.document,
    })
}

/// A subject evaluated on demand, with its explanation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DecisionView {
    pub subject: String,
    pub result: PolicyEvaluationResult,
    pub explanation: Explanation,
}

impl DecisionView {
    fn new(subject: &str, result: PolicyEvaluationResult) -> Self {
        let explanation = explain(&result);
        Self {
            subject: subject.trim().to_string(),
            result,
            explanation,
        }
    }
}

pub fn tool_view(
    engine: &PolicyEngine,
    tool_id: &str,
    action: &str,
) -> Result<DecisionView, DiagnosticsError> {
    let result = engine.evaluate_tool(tool_id, action)?;
    Ok(DecisionView::new(tool_id, result))
}

pub fn plugin_view(
    engine: &PolicyEngine,
    plugin_id: &str,
    author: Option<&str>,
    risk_level: Option<RiskLevel>,
) -> Result<DecisionView, DiagnosticsError> {
    let result = engine.evaluate_plugin(plugin_id, author, risk_level)?;
    Ok(DecisionView::new(plugin_id, result))
}

pub fn domain_view(engine: &PolicyEngine, domain: &str) -> Result<DecisionView, DiagnosticsError> {
    let result = engine.evaluate_domain(domain)?;
    Ok(DecisionView::new(domain, result))
}

/// Everything that currently governs behaviour, merged.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EffectivePolicy {
    pub generated_at: DateTime<Utc>,
    pub sources: Vec<SourceStatus>,
    pub memory: MergedMemorySettings,
    pub connectivity: MergedConnectivitySettings,
    pub updates: MergedUpdateSettings,
    pub grants: Vec<SessionGrant>,
}

pub fn effective_policy(engine: &PolicyEngine) -> EffectivePolicy {
    let policy = EffectivePolicy {
        generated_at: engine.clock().now(),
        sources: status(engine).sources,
        memory: engine.evaluate_memory_policy(),
        connectivity: engine.evaluate_connectivity_policy(),
        updates: engine.evaluate_update_policy(),
        grants: engine.grants(None),
    };
    tracing::debug!(
        sources = policy.sources.len(),
        grants = policy.grants.len(),
        "built effective policy"
    );
    policy
}

pub fn export_json(engine: &PolicyEngine) -> Result<String, DiagnosticsError> {
    Ok(serde_json::to_string_pretty(&effective_policy(engine))?)
}

pub fn export_text(engine: &PolicyEngine) -> String {
    render_text(&effective_policy(engine))
}

fn or_none<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "none".to_string())
}

fn list(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

/// Plain-text rendering. `writeln!` into a String cannot fail.
pub fn render_text(policy: &EffectivePolicy) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Effective policy ({})", policy.generated_at.to_rfc3339());

    let _ = writeln!(out, "\nSources:");
    if policy.sources.is_empty() {
        let _ = writeln!(out, "  (none loaded; built-in defaults apply)");
    }
    for s in &policy.sources {
        let path = s
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(in memory)".to_string());
        let lock = if s.locked { ", locked" } else { "" };
        let _ = writeln!(out, "  {:<12} v{}{}  {}", s.source.as_str(), s.version, lock, path);
    }

    let m = &policy.memory;
    let _ = writeln!(out, "\nMemory:");
    let _ = writeln!(out, "  enabled:            {}", m.enabled);
    let _ = writeln!(out, "  retention days:     {}", or_none(m.max_retention_days));
    let _ = writeln!(out, "  max memories:       {}", or_none(m.max_memories));
    let _ = writeln!(out, "  encrypt at rest:    {}", m.encrypt_at_rest);
    let _ = writeln!(out, "  auto formation:     {}", m.auto_formation);
    let _ = writeln!(out, "  excluded:           {}", list(&m.exclude_categories));
    let _ = writeln!(out, "  export / import:    {} / {}", m.allow_export, m.allow_import);

    let c = &policy.connectivity;
    let modes: Vec<String> = c.allowed_modes.iter().map(|m| m.to_string()).collect();
    let _ = writeln!(out, "\nConnectivity:");
    let _ = writeln!(out, "  allowed modes:      {}", list(&modes));
    let _ = writeln!(out, "  default mode:       {}", c.default_mode);
    let _ = writeln!(out, "  mode change:        {}", c.allow_mode_change);
    let _ = writeln!(out, "  allowed domains:    {}", list(&c.allowed_domains));
    let _ = writeln!(out, "  blocked domains:    {}", list(&c.blocked_domains));
    let _ = writeln!(out, "  telemetry:          {}", c.allow_telemetry);

    let u = &policy.updates;
    let channels: Vec<String> = u.allowed_channels.iter().map(|c| c.to_string()).collect();
    let _ = writeln!(out, "\nUpdates:");
    let _ = writeln!(out, "  auto update:        {}", u.auto_update);
    let _ = writeln!(out, "  allowed channels:   {}", list(&channels));
    let _ = writeln!(out, "  required channel:   {}", or_none(u.required_channel));
    let _ = writeln!(out, "  defer days:         {}", u.defer_days);
    let _ = writeln!(out, "  check on startup:   {}", u.check_on_startup);
    let _ = writeln!(out, "  minimum version:    {}", or_none(u.minimum_version.as_deref()));

    let _ = writeln!(out, "\nSession grants: {}", policy.grants.len());
    for g in &policy.grants {
        let _ = writeln!(out, "  {}:{} (by {})", g.category, g.subject, g.granted_by);
    }
    out
}
