// check.rs — Evaluate one subject against the loaded policy and explain it.

use std::sync::Arc;

use anyhow::Context as _;
use clap::Subcommand;

use gov_audit::JournalObserver;
use gov_diagnostics::{domain_view, plugin_view, tool_view, DecisionView};
use gov_policy::{PolicyCategory, PolicyEngine};

use super::{report_problems, Context, RiskArg};

#[derive(Subcommand)]
pub enum CheckCommands {
    /// Evaluate a tool invocation.
    Tool {
        /// Tool id, e.g. "fs.read".
        tool_id: String,
        /// Action being attempted.
        #[arg(long, default_value = "invoke")]
        action: String,
        /// Append the result to the audit journal.
        #[arg(long)]
        record: bool,
    },
    /// Evaluate loading a plugin.
    Plugin {
        plugin_id: String,
        #[arg(long)]
        author: Option<String>,
        /// Declared risk level (undeclared is treated as network).
        #[arg(long, value_enum)]
        risk: Option<RiskArg>,
        #[arg(long)]
        record: bool,
    },
    /// Evaluate a network destination.
    Domain {
        domain: String,
        #[arg(long)]
        record: bool,
    },
}

pub async fn execute(cmd: &CheckCommands, ctx: &Context) -> anyhow::Result<()> {
    let (engine, summary) = ctx.load_engine().await;
    report_problems(&summary);

    let (category, view, record) = match cmd {
        CheckCommands::Tool {
            tool_id,
            action,
            record,
        } => (
            PolicyCategory::Tools,
            tool_view(&engine, tool_id, action)?,
            *record,
        ),
        CheckCommands::Plugin {
            plugin_id,
            author,
            risk,
            record,
        } => {
            let risk = Some(risk.map(Into::into).unwrap_or(gov_policy::RiskLevel::Network));
            (
                PolicyCategory::Plugins,
                plugin_view(&engine, plugin_id, author.as_deref(), risk)?,
                *record,
            )
        }
        CheckCommands::Domain { domain, record } => (
            PolicyCategory::Connectivity,
            domain_view(&engine, domain)?,
            *record,
        ),
    };

    if record {
        record_check(&engine, ctx, category, &view)?;
    }

    if ctx.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{}: {}", view.subject, view.explanation);
    }
    Ok(())
}

fn record_check(
    engine: &PolicyEngine,
    ctx: &Context,
    category: PolicyCategory,
    view: &DecisionView,
) -> anyhow::Result<()> {
    let observer = JournalObserver::open(&ctx.audit_log)
        .with_context(|| format!("failed to open audit journal {}", ctx.audit_log.display()))?;
    engine.add_observer(Arc::new(observer));
    engine.record_result(category, &view.subject, "check", &view.result);
    tracing::info!(path = %ctx.audit_log.display(), "check recorded");
    Ok(())
}
