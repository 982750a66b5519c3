// settings.rs — Settings merge for memory, connectivity, and updates.
//
// This differs fundamentally from the tool/plugin decision tree:
//
// - Scalar fields take the first stated value scanning Organization → Team →
//   User. A genuine override: the strongest source that says something wins.
//   Session documents do not override scalars.
// - Allow-style lists (allowed domains/modes/channels) take the first
//   non-empty list in the same order.
// - Restriction collections (blocked domains, excluded memory categories) are
//   the union across *every* loaded source. A weaker source can add a
//   restriction but can never remove one added upstream.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::document::{ConnectivityMode, PolicyDocument, UpdateChannel};
use crate::domain::normalize_domain;
use crate::source::PolicySource;

/// A loaded document paired with its source, in precedence order.
pub type SourcedDocument<'a> = (PolicySource, &'a PolicyDocument);

/// Effective memory settings.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MergedMemorySettings {
    pub enabled: bool,
    /// `None` = keep forever.
    pub max_retention_days: Option<u32>,
    /// `None` = no count limit.
    pub max_memories: Option<u32>,
    pub encrypt_at_rest: bool,
    pub auto_formation: bool,
    /// Union across all sources, lowercased.
    pub exclude_categories: Vec<String>,
    pub allow_export: bool,
    pub allow_import: bool,
    /// Which source supplied each stated field (absent = built-in default).
    pub field_sources: BTreeMap<String, PolicySource>,
}

impl Default for MergedMemorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retention_days: None,
            max_memories: None,
            encrypt_at_rest: false,
            auto_formation: true,
            exclude_categories: Vec::new(),
            allow_export: true,
            allow_import: true,
            field_sources: BTreeMap::new(),
        }
    }
}

impl MergedMemorySettings {
    pub fn is_category_excluded(&self, category: &str) -> bool {
        let category = category.to_lowercase();
        self.exclude_categories.iter().any(|c| *c == category)
    }

    /// Source of a field, or Default when no document stated it.
    pub fn source_of(&self, field: &str) -> PolicySource {
        self.field_sources
            .get(field)
            .copied()
            .unwrap_or(PolicySource::Default)
    }
}

/// Effective connectivity settings.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MergedConnectivitySettings {
    /// Never empty: all modes when no source restricts them.
    pub allowed_modes: Vec<ConnectivityMode>,
    pub default_mode: ConnectivityMode,
    pub allow_mode_change: bool,
    /// Empty = no allow-list restriction.
    pub allowed_domains: Vec<String>,
    /// Union across all sources, normalized.
    pub blocked_domains: Vec<String>,
    /// Strongest source that blocked each domain.
    pub blocked_by: BTreeMap<String, PolicySource>,
    pub allow_telemetry: bool,
    pub field_sources: BTreeMap<String, PolicySource>,
}

impl Default for MergedConnectivitySettings {
    fn default() -> Self {
        Self {
            allowed_modes: ConnectivityMode::ALL.to_vec(),
            default_mode: ConnectivityMode::Online,
            allow_mode_change: true,
            allowed_domains: Vec::new(),
            blocked_domains: Vec::new(),
            blocked_by: BTreeMap::new(),
            allow_telemetry: false,
            field_sources: BTreeMap::new(),
        }
    }
}

impl MergedConnectivitySettings {
    pub fn is_mode_allowed(&self, mode: ConnectivityMode) -> bool {
        self.allowed_modes.contains(&mode)
    }

    pub fn source_of(&self, field: &str) -> PolicySource {
        self.field_sources
            .get(field)
            .copied()
            .unwrap_or(PolicySource::Default)
    }
}

/// Effective update settings.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MergedUpdateSettings {
    pub auto_update: bool,
    /// Empty = every channel allowed.
    pub allowed_channels: Vec<UpdateChannel>,
    pub required_channel: Option<UpdateChannel>,
    pub defer_days: u32,
    pub check_on_startup: bool,
    pub minimum_version: Option<String>,
    pub field_sources: BTreeMap<String, PolicySource>,
}

impl Default for MergedUpdateSettings {
    fn default() -> Self {
        Self {
            auto_update: true,
            allowed_channels: Vec::new(),
            required_channel: None,
            defer_days: 0,
            check_on_startup: true,
            minimum_version: None,
            field_sources: BTreeMap::new(),
        }
    }
}

impl MergedUpdateSettings {
    /// Required channel first: if set, only that channel complies. Otherwise
    /// the allowed-channel list applies when present.
    pub fn is_channel_compliant(&self, channel: UpdateChannel) -> bool {
        match self.required_channel {
            Some(required) => channel == required,
            None => self.allowed_channels.is_empty() || self.allowed_channels.contains(&channel),
        }
    }

    pub fn source_of(&self, field: &str) -> PolicySource {
        self.field_sources
            .get(field)
            .copied()
            .unwrap_or(PolicySource::Default)
    }
}

/// Tracks which source supplied each field while merging.
struct Merger<'a, 'd> {
    docs: &'a [SourcedDocument<'d>],
    field_sources: BTreeMap<String, PolicySource>,
}

impl<'a, 'd> Merger<'a, 'd> {
    fn new(docs: &'a [SourcedDocument<'d>]) -> Self {
        Self {
            docs,
            field_sources: BTreeMap::new(),
        }
    }

    fn scalar_sources(&self) -> impl Iterator<Item = &'a SourcedDocument<'d>> {
        self.docs
            .iter()
            .filter(|(source, _)| PolicySource::SETTINGS_SOURCES.contains(source))
    }

    /// First stated value, Organization → Team → User.
    fn first<T>(&mut self, field: &str, get: impl Fn(&PolicyDocument) -> Option<T>) -> Option<T> {
        let found = self
            .scalar_sources()
            .find_map(|(source, doc)| get(doc).map(|v| (*source, v)));
        found.map(|(source, value)| {
            self.field_sources.insert(field.to_string(), source);
            value
        })
    }

    /// First non-empty list, Organization → Team → User.
    fn first_list<T: Clone>(
        &mut self,
        field: &str,
        get: impl Fn(&PolicyDocument) -> &Vec<T>,
    ) -> Vec<T> {
        self.first(field, |doc| {
            let list = get(doc);
            if list.is_empty() {
                None
            } else {
                Some(list.clone())
            }
        })
        .unwrap_or_default()
    }

    /// Union across every loaded source (Session included), keyed by the
    /// normalized value. Records the strongest source for each entry.
    fn union(
        &mut self,
        field: &str,
        get: impl Fn(&PolicyDocument) -> &Vec<String>,
        normalize: impl Fn(&str) -> String,
    ) -> (Vec<String>, BTreeMap<String, PolicySource>) {
        let mut by: BTreeMap<String, PolicySource> = BTreeMap::new();
        for (source, doc) in self.docs {
            for raw in get(doc) {
                let key = normalize(raw);
                if key.is_empty() {
                    continue;
                }
                by.entry(key).or_insert(*source);
            }
        }
        if let Some(strongest) = by.values().min() {
            self.field_sources.insert(field.to_string(), *strongest);
        }
        (by.keys().cloned().collect(), by)
    }
}

/// Merge memory settings from documents in precedence order.
pub fn merge_memory(docs: &[SourcedDocument<'_>]) -> MergedMemorySettings {
    let defaults = MergedMemorySettings::default();
    let mut m = Merger::new(docs);
    let enabled = m.first("enabled", |d| d.memory.enabled);
    // Zero is the "no limit" value and counts as unstated.
    let max_retention_days = m.first("maxRetentionDays", |d| {
        d.memory.max_retention_days.filter(|days| *days > 0)
    });
    let max_memories = m.first("maxMemories", |d| d.memory.max_memories.filter(|n| *n > 0));
    let encrypt_at_rest = m.first("encryptAtRest", |d| d.memory.encrypt_at_rest);
    let auto_formation = m.first("autoFormation", |d| d.memory.auto_formation);
    let allow_export = m.first("allowExport", |d| d.memory.allow_export);
    let allow_import = m.first("allowImport", |d| d.memory.allow_import);
    let (exclude_categories, _) = m.union(
        "excludeCategories",
        |d| &d.memory.exclude_categories,
        |c| c.trim().to_lowercase(),
    );

    MergedMemorySettings {
        enabled: enabled.unwrap_or(defaults.enabled),
        max_retention_days,
        max_memories,
        encrypt_at_rest: encrypt_at_rest.unwrap_or(defaults.encrypt_at_rest),
        auto_formation: auto_formation.unwrap_or(defaults.auto_formation),
        exclude_categories,
        allow_export: allow_export.unwrap_or(defaults.allow_export),
        allow_import: allow_import.unwrap_or(defaults.allow_import),
        field_sources: m.field_sources,
    }
}

/// Merge connectivity settings from documents in precedence order.
pub fn merge_connectivity(docs: &[SourcedDocument<'_>]) -> MergedConnectivitySettings {
    let defaults = MergedConnectivitySettings::default();
    let mut m = Merger::new(docs);
    let mut allowed_modes = m.first_list("allowedModes", |d| &d.connectivity.allowed_modes);
    if allowed_modes.is_empty() {
        allowed_modes = defaults.allowed_modes.clone();
    }
    let default_mode = m
        .first("defaultMode", |d| d.connectivity.default_mode)
        .filter(|mode| allowed_modes.contains(mode))
        .or_else(|| {
            // Without a usable stated default, fall back to the most
            // permissive mode the allowed set still permits.
            if allowed_modes.contains(&defaults.default_mode) {
                Some(defaults.default_mode)
            } else {
                allowed_modes.iter().max().copied()
            }
        })
        .unwrap_or(defaults.default_mode);
    let allow_mode_change = m.first("allowModeChange", |d| d.connectivity.allow_mode_change);
    let allowed_domains: Vec<String> = m
        .first_list("allowedDomains", |d| &d.connectivity.allowed_domains)
        .iter()
        .map(|d| normalize_domain(d))
        .collect();
    let allow_telemetry = m.first("allowTelemetry", |d| d.connectivity.allow_telemetry);
    let (blocked_domains, blocked_by) = m.union(
        "blockedDomains",
        |d| &d.connectivity.blocked_domains,
        normalize_domain,
    );

    MergedConnectivitySettings {
        allowed_modes,
        default_mode,
        allow_mode_change: allow_mode_change.unwrap_or(defaults.allow_mode_change),
        allowed_domains,
        blocked_domains,
        blocked_by,
        allow_telemetry: allow_telemetry.unwrap_or(defaults.allow_telemetry),
        field_sources: m.field_sources,
    }
}

/// Merge update settings from documents in precedence order.
pub fn merge_updates(docs: &[SourcedDocument<'_>]) -> MergedUpdateSettings {
    let defaults = MergedUpdateSettings::default();
    let mut m = Merger::new(docs);
    let auto_update = m.first("autoUpdate", |d| d.updates.auto_update);
    let allowed_channels = m.first_list("allowedChannels", |d| &d.updates.allowed_channels);
    let required_channel = m.first("requiredChannel", |d| d.updates.required_channel);
    let defer_days = m.first("deferDays", |d| d.updates.defer_days.filter(|n| *n > 0));
    let check_on_startup = m.first("checkOnStartup", |d| d.updates.check_on_startup);
    let minimum_version = m.first("minimumVersion", |d| d.updates.minimum_version.clone());

    MergedUpdateSettings {
        auto_update: auto_update.unwrap_or(defaults.auto_update),
        allowed_channels,
        required_channel,
        defer_days: defer_days.unwrap_or(defaults.defer_days),
        check_on_startup: check_on_startup.unwrap_or(defaults.check_on_startup),
        minimum_version,
        field_sources: m.field_sources,
    }
}
