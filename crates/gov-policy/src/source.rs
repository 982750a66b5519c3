// source.rs — Policy sources and categories.
//
// The precedence order of PolicySource is the single source of truth for
// conflict resolution: lower numeric value = consulted first = wins.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a policy (or a decision) came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PolicySource {
    Organization,
    Team,
    User,
    Session,
    /// Built-in fallback when no document decides.
    Default,
}

impl PolicySource {
    /// Sources that can hold a document, in precedence order.
    pub const DOCUMENT_SOURCES: [PolicySource; 4] = [
        PolicySource::Organization,
        PolicySource::Team,
        PolicySource::User,
        PolicySource::Session,
    ];

    /// Sources whose scalar settings participate in the settings merge.
    pub const SETTINGS_SOURCES: [PolicySource; 3] = [
        PolicySource::Organization,
        PolicySource::Team,
        PolicySource::User,
    ];

    /// Numeric precedence. Lower is stronger.
    pub fn precedence(self) -> u8 {
        match self {
            PolicySource::Organization => 1,
            PolicySource::Team => 2,
            PolicySource::User => 3,
            PolicySource::Session => 4,
            PolicySource::Default => 100,
        }
    }

    /// Sources that are loaded from files (Session is programmatic only).
    pub fn is_file_backed(self) -> bool {
        matches!(
            self,
            PolicySource::Organization | PolicySource::Team | PolicySource::User
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PolicySource::Organization => "organization",
            PolicySource::Team => "team",
            PolicySource::User => "user",
            PolicySource::Session => "session",
            PolicySource::Default => "default",
        }
    }
}

impl PartialOrd for PolicySource {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordering follows precedence: `Organization < Team < ... < Default`.
impl Ord for PolicySource {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence().cmp(&other.precedence())
    }
}

impl fmt::Display for PolicySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The governed capability areas.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCategory {
    Tools,
    Plugins,
    Memory,
    Connectivity,
    Updates,
}

impl PolicyCategory {
    pub const ALL: [PolicyCategory; 5] = [
        PolicyCategory::Tools,
        PolicyCategory::Plugins,
        PolicyCategory::Memory,
        PolicyCategory::Connectivity,
        PolicyCategory::Updates,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PolicyCategory::Tools => "tools",
            PolicyCategory::Plugins => "plugins",
            PolicyCategory::Memory => "memory",
            PolicyCategory::Connectivity => "connectivity",
            PolicyCategory::Updates => "updates",
        }
    }
}

impl fmt::Display for PolicyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
