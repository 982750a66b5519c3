// status.rs — Loaded sources, their fingerprints, and load problems.

use gov_audit::hasher;
use gov_diagnostics::{status, StatusSummary};
use gov_policy::{LoadOutcome, PolicySource, SourceLoad};

use super::Context;

pub async fn execute(ctx: &Context) -> anyhow::Result<()> {
    let (engine, summary) = ctx.load_engine().await;
    let loaded = status(&engine);

    if ctx.json {
        let sources = summary
            .sources
            .iter()
            .map(|s| {
                let mut value = serde_json::to_value(s)?;
                if let Some(fingerprint) = fingerprint(s) {
                    value["fingerprint"] = serde_json::Value::String(fingerprint);
                }
                Ok(value)
            })
            .collect::<Result<Vec<_>, serde_json::Error>>()?;
        let report = serde_json::json!({
            "sources": sources,
            "loaded": loaded.sources,
            "clean": summary.is_clean(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{:<14} {:<10} {:<14} PATH", "SOURCE", "STATUS", "FINGERPRINT");
    println!("{}", "-".repeat(72));
    for s in &summary.sources {
        let state = match &s.outcome {
            LoadOutcome::Missing => "missing",
            LoadOutcome::Loaded => "loaded",
            LoadOutcome::Failed { .. } => "failed",
            LoadOutcome::Invalid { .. } => "invalid",
        };
        let path = s
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        let fp = fingerprint(s).unwrap_or_else(|| "-".to_string());
        println!(
            "{:<14} {:<10} {:<14} {}",
            s.source.as_str(),
            state,
            hasher::short(&fp),
            path
        );
        match &s.outcome {
            LoadOutcome::Failed { error } => println!("    {}", error),
            LoadOutcome::Invalid { issues } => {
                for issue in issues {
                    println!("    {}: {} ({})", issue.path, issue.message, issue.kind);
                }
            }
            LoadOutcome::Missing | LoadOutcome::Loaded => {}
        }
    }
    println!();
    println!(
        "{} source(s) loaded{}",
        loaded.sources.len(),
        if organization_locked(&loaded) {
            "; organization policy is locked"
        } else {
            ""
        }
    );
    Ok(())
}

/// Only the Organization source's lock is honoured.
fn organization_locked(loaded: &StatusSummary) -> bool {
    loaded
        .sources
        .iter()
        .any(|s| s.source == PolicySource::Organization && s.locked)
}

/// SHA-256 of a loaded file. Unreadable files simply have no fingerprint.
fn fingerprint(load: &SourceLoad) -> Option<String> {
    if !matches!(load.outcome, LoadOutcome::Loaded) {
        return None;
    }
    let path = load.path.as_ref()?;
    match hasher::hash_file(path) {
        Ok(hash) => Some(hash),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not fingerprint policy file");
            None
        }
    }
}
