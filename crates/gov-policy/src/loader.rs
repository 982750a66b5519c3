// loader.rs — Loading policy documents from the standard file locations.
//
// Organization and Team policies live under a system-wide configuration root,
// the User policy under the per-user config directory. Session is never
// file-backed.
//
// Loading is the only asynchronous operation in this crate. Every file is
// read and validated first; the engine's file-backed documents are then
// replaced in one locked swap so concurrent evaluators never observe a
// half-loaded set.
//
// A missing file is not an error. A file that cannot be read, is not JSON, or
// fails validation is reported in the LoadSummary and contributes nothing.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::document::PolicyDocument;
use crate::engine::{LoadedDocument, PolicyEngine};
use crate::error::PolicyError;
use crate::source::PolicySource;
use crate::validate::{parse_document, ValidationIssue};

/// Overrides the system configuration root.
pub const SYSTEM_DIR_ENV: &str = "GOVERNOR_SYSTEM_DIR";

/// Overrides the per-user configuration root.
pub const USER_DIR_ENV: &str = "GOVERNOR_USER_DIR";

/// Where each file-backed source is read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyLocations {
    pub organization: PathBuf,
    pub team: PathBuf,
    /// None when no per-user config directory could be determined.
    pub user: Option<PathBuf>,
}

impl PolicyLocations {
    /// Platform default locations.
    pub fn standard() -> Self {
        let user_dir = dirs::config_dir().map(|d| d.join("governor"));
        Self::in_dirs(default_system_dir(), user_dir)
    }

    /// Standard locations, with `GOVERNOR_SYSTEM_DIR` / `GOVERNOR_USER_DIR`
    /// overriding the roots when set.
    pub fn from_env() -> Self {
        let system = std::env::var_os(SYSTEM_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_system_dir);
        let user = std::env::var_os(USER_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|d| d.join("governor")));
        Self::in_dirs(system, user)
    }

    /// Locations rooted at explicit directories.
    pub fn in_dirs(system_dir: impl Into<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        let system_dir = system_dir.into();
        Self {
            organization: system_dir.join("organization.json"),
            team: system_dir.join("team.json"),
            user: user_dir.map(|d| d.join("user.json")),
        }
    }

    pub fn path_for(&self, source: PolicySource) -> Option<&Path> {
        match source {
            PolicySource::Organization => Some(&self.organization),
            PolicySource::Team => Some(&self.team),
            PolicySource::User => self.user.as_deref(),
            PolicySource::Session | PolicySource::Default => None,
        }
    }
}

#[cfg(windows)]
fn default_system_dir() -> PathBuf {
    std::env::var_os("ProgramData")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"))
        .join("Governor")
}

#[cfg(not(windows))]
fn default_system_dir() -> PathBuf {
    PathBuf::from("/etc/governor")
}

/// What happened when loading one source.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// No file at the location (or no location for this platform).
    Missing,
    /// Loaded and validated.
    Loaded,
    /// Unreadable or not JSON.
    Failed { error: String },
    /// Parsed but rejected by validation.
    Invalid { issues: Vec<ValidationIssue> },
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceLoad {
    pub source: PolicySource,
    pub path: Option<PathBuf>,
    #[serde(flatten)]
    pub outcome: LoadOutcome,
}

/// Per-source results of a load pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadSummary {
    pub sources: Vec<SourceLoad>,
}

impl LoadSummary {
    pub fn loaded(&self) -> impl Iterator<Item = PolicySource> + '_ {
        self.sources
            .iter()
            .filter(|s| matches!(s.outcome, LoadOutcome::Loaded))
            .map(|s| s.source)
    }

    /// Sources that failed to read/parse or failed validation.
    pub fn problems(&self) -> impl Iterator<Item = &SourceLoad> {
        self.sources
            .iter()
            .filter(|s| matches!(s.outcome, LoadOutcome::Failed { .. } | LoadOutcome::Invalid { .. }))
    }

    pub fn is_clean(&self) -> bool {
        self.problems().next().is_none()
    }

    pub fn outcome(&self, source: PolicySource) -> Option<&LoadOutcome> {
        self.sources
            .iter()
            .find(|s| s.source == source)
            .map(|s| &s.outcome)
    }
}

/// Read and validate one policy file. `Ok(None)` means the file is absent.
pub async fn read_document(
    path: &Path,
    source: PolicySource,
) -> Result<Option<PolicyDocument>, PolicyError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PolicyError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| PolicyError::MalformedJson {
            path: path.to_path_buf(),
            source: e,
        })?;
    parse_document(&value, source).map(Some)
}

/// Load every file-backed source and swap the results into the engine.
///
/// The Session document is left untouched. A source whose file is missing or
/// broken ends up with no document.
pub async fn load_from_locations(
    engine: &PolicyEngine,
    locations: &PolicyLocations,
) -> LoadSummary {
    let mut summary = LoadSummary::default();
    let mut documents = Vec::new();

    for source in PolicySource::SETTINGS_SOURCES {
        let Some(path) = locations.path_for(source) else {
            summary.sources.push(SourceLoad {
                source,
                path: None,
                outcome: LoadOutcome::Missing,
            });
            continue;
        };

        let outcome = match read_document(path, source).await {
            Ok(Some(document)) => {
                documents.push(LoadedDocument {
                    source,
                    path: Some(path.to_path_buf()),
                    document,
                    loaded_at: engine.clock().now(),
                });
                tracing::info!(source = %source, path = %path.display(), "policy loaded");
                LoadOutcome::Loaded
            }
            Ok(None) => {
                tracing::debug!(source = %source, path = %path.display(), "no policy file");
                LoadOutcome::Missing
            }
            Err(PolicyError::Validation { issues, .. }) => {
                tracing::warn!(
                    source = %source,
                    path = %path.display(),
                    issues = issues.len(),
                    "policy rejected by validation"
                );
                LoadOutcome::Invalid { issues }
            }
            Err(e) => {
                tracing::warn!(source = %source, path = %path.display(), error = %e, "policy load failed");
                LoadOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        summary.sources.push(SourceLoad {
            source,
            path: Some(path.to_path_buf()),
            outcome,
        });
    }

    engine.replace_file_documents(documents);
    summary
}
