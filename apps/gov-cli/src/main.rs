//! # gov-cli
//!
//! Command-line interface for Governor policy.
//!
//! - `gov validate <file>` — check a policy document and list every issue
//! - `gov status` — loaded sources, file fingerprints, and load problems
//! - `gov check tool/plugin/domain` — evaluate one subject and explain it
//! - `gov export` — the effective (merged) policy as text or JSON
//! - `gov audit verify/tail` — inspect the persisted audit journal

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gov_policy::PolicyLocations;

/// Governor CLI — validate, inspect, and audit capability policy.
#[derive(Parser)]
#[command(name = "gov", version, about)]
struct Cli {
    /// Directory holding organization.json and team.json
    /// (defaults to $GOVERNOR_SYSTEM_DIR, then the platform location).
    #[arg(long, global = true)]
    system_dir: Option<PathBuf>,

    /// Directory holding user.json
    /// (defaults to $GOVERNOR_USER_DIR, then the per-user config dir).
    #[arg(long, global = true)]
    user_dir: Option<PathBuf>,

    /// Audit journal path (defaults to the per-user data dir).
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    /// Print JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a policy document without loading it.
    Validate {
        /// Path to the JSON document.
        file: PathBuf,
        /// Source the document is meant for.
        #[arg(long, value_enum, default_value = "user")]
        source: commands::SourceArg,
    },
    /// Show loaded sources and load problems.
    Status,
    /// Evaluate a tool, plugin, or domain against the loaded policy.
    Check {
        #[command(subcommand)]
        command: commands::check::CheckCommands,
    },
    /// Print the effective merged policy.
    Export,
    /// Inspect the audit journal.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never mix with command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("gov_policy=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let ctx = commands::Context {
        locations: resolve_locations(cli.system_dir, cli.user_dir),
        audit_log: cli.audit_log.unwrap_or_else(commands::default_audit_log),
        json: cli.json,
    };

    match &cli.command {
        Commands::Validate { file, source } => commands::validate::execute(file, (*source).into(), &ctx),
        Commands::Status => commands::status::execute(&ctx).await,
        Commands::Check { command } => commands::check::execute(command, &ctx).await,
        Commands::Export => commands::export::execute(&ctx).await,
        Commands::Audit { command } => commands::audit::execute(command, &ctx),
    }
}

/// Explicit flags win over the environment; the environment over defaults.
fn resolve_locations(system_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> PolicyLocations {
    let env = PolicyLocations::from_env();
    match (system_dir, user_dir) {
        (None, None) => env,
        (system, user) => {
            let system = system.unwrap_or_else(|| {
                env.organization
                    .parent()
                    .map(PathBuf::from)
                    .unwrap_or_default()
            });
            let user = user.or_else(|| env.user.as_ref().and_then(|p| p.parent()).map(PathBuf::from));
            PolicyLocations::in_dirs(system, user)
        }
    }
}
