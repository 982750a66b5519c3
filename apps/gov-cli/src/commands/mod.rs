// mod.rs — Shared command context and helpers.

pub mod audit;
pub mod check;
pub mod export;
pub mod status;
pub mod validate;

use std::path::PathBuf;

use clap::ValueEnum;

use gov_policy::{load_from_locations, LoadSummary, PolicyEngine, PolicyLocations, PolicySource, RiskLevel};

/// Resolved global options.
pub struct Context {
    pub locations: PolicyLocations,
    pub audit_log: PathBuf,
    pub json: bool,
}

impl Context {
    /// Build an engine from the configured locations.
    pub async fn load_engine(&self) -> (PolicyEngine, LoadSummary) {
        let engine = PolicyEngine::new();
        let summary = load_from_locations(&engine, &self.locations).await;
        (engine, summary)
    }
}

/// `<data dir>/governor/audit.jsonl`, or `./governor-audit.jsonl` when the
/// platform has no data dir.
pub fn default_audit_log() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("governor").join("audit.jsonl"))
        .unwrap_or_else(|| PathBuf::from("governor-audit.jsonl"))
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SourceArg {
    Organization,
    Team,
    User,
    Session,
}

impl From<SourceArg> for PolicySource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Organization => PolicySource::Organization,
            SourceArg::Team => PolicySource::Team,
            SourceArg::User => PolicySource::User,
            SourceArg::Session => PolicySource::Session,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RiskArg {
    ReadOnly,
    LocalMutation,
    Network,
}

impl From<RiskArg> for RiskLevel {
    fn from(arg: RiskArg) -> Self {
        match arg {
            RiskArg::ReadOnly => RiskLevel::ReadOnly,
            RiskArg::LocalMutation => RiskLevel::LocalMutation,
            RiskArg::Network => RiskLevel::Network,
        }
    }
}

/// Print any load problems to stderr so they are never missed.
pub fn report_problems(summary: &LoadSummary) {
    for problem in summary.problems() {
        let path = problem
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        eprintln!("warning: {} policy at {} was not loaded", problem.source, path);
    }
}
