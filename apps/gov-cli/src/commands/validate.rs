// validate.rs — Validate a policy document and list every issue at once.

use std::path::Path;

use anyhow::Context as _;

use gov_policy::validate::validate_value;
use gov_policy::{PolicySource, ValidationIssue};

use super::Context;

pub fn execute(file: &Path, source: PolicySource, ctx: &Context) -> anyhow::Result<()> {
    let issues = check_file(file)?;

    if ctx.json {
        let report = serde_json::json!({
            "file": file.display().to_string(),
            "source": source,
            "valid": issues.is_empty(),
            "issues": issues,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if issues.is_empty() {
        println!("{}: valid {} policy", file.display(), source);
    } else {
        println!("{}: {} issue(s)", file.display(), issues.len());
        for issue in &issues {
            println!("  {:<32} {:<24} {}", issue.path, issue.kind.to_string(), issue.message);
        }
    }

    if !issues.is_empty() {
        anyhow::bail!("policy document failed validation");
    }
    Ok(())
}

/// Read and validate a file. I/O and JSON syntax errors are hard errors;
/// schema problems come back as issues.
pub fn check_file(file: &Path) -> anyhow::Result<Vec<ValidationIssue>> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;
    Ok(validate_value(&value))
}
