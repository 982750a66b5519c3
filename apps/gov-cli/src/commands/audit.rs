// audit.rs — Audit subcommands: verify, tail.

use std::path::{Path, PathBuf};

use clap::Subcommand;

use gov_audit::{AuditError, AuditJournal};

use super::Context;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify the journal's hash chain.
    Verify {
        /// Path to the journal (defaults to --audit-log).
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Show recent audit entries.
    Tail {
        /// Path to the journal (defaults to --audit-log).
        #[arg(long)]
        log: Option<PathBuf>,
        /// Number of entries to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
}

pub fn execute(cmd: &AuditCommands, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        AuditCommands::Verify { log } => {
            let path = log.as_deref().unwrap_or(&ctx.audit_log);
            if !path.exists() {
                println!("No audit journal found at {}", path.display());
                return Ok(());
            }
            verify(path)
        }
        AuditCommands::Tail { log, n } => {
            let path = log.as_deref().unwrap_or(&ctx.audit_log);
            if !path.exists() {
                println!("No audit journal found at {}", path.display());
                return Ok(());
            }
            tail(path, *n, ctx.json)
        }
    }
}

fn verify(path: &Path) -> anyhow::Result<()> {
    match AuditJournal::verify_chain(path) {
        Ok(count) => {
            println!("Audit journal verified: {} entry(ies), hash chain intact.", count);
            Ok(())
        }
        Err(AuditError::IntegrityViolation {
            line,
            expected,
            actual,
        }) => {
            println!("INTEGRITY VIOLATION at line {}:", line);
            println!("  Expected previous_hash: {}", expected);
            println!("  Actual previous_hash:   {}", actual);
            println!();
            println!("The audit journal may have been tampered with.");
            anyhow::bail!("audit journal integrity check failed");
        }
        Err(e) => Err(e.into()),
    }
}

fn tail(path: &Path, n: usize, json: bool) -> anyhow::Result<()> {
    let records = AuditJournal::tail(path, n)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No audit entries.");
        return Ok(());
    }

    println!(
        "{:<20} {:<13} {:<20} {:<14} {:<20} SUBJECT",
        "TIMESTAMP", "CATEGORY", "DECISION", "SOURCE", "ACTION"
    );
    println!("{}", "-".repeat(100));
    for record in &records {
        let e = &record.entry;
        println!(
            "{:<20} {:<13} {:<20} {:<14} {:<20} {}",
            e.timestamp.format("%Y-%m-%d %H:%M:%S"),
            e.category.as_str(),
            e.decision.as_str(),
            e.source.as_str(),
            e.action,
            e.subject,
        );
    }
    Ok(())
}
