// validate.rs — Structural and semantic validation of policy documents.
//
// Validation walks the untyped JSON value rather than the typed model so a
// single pass can report *every* problem: an unknown enum value would abort
// serde deserialization at the first error, hiding the rest.
//
// A document is either fully usable or rejected — `parse_document` never
// returns a partially-populated PolicyDocument.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::condition::TimeRange;
use crate::document::{ConnectivityMode, PolicyDocument, RiskLevel, UpdateChannel};
use crate::decision::DecisionKind;
use crate::error::PolicyError;
use crate::source::PolicySource;
use crate::version::{is_valid_schema_version, Version};

/// Upper bound for `memory.maxRetentionDays` and `updates.deferDays`.
pub const MAX_DAYS: u64 = 365;

/// Upper bound for `memory.maxMemories`.
pub const MAX_MEMORIES: u64 = 1_000_000;

/// What kind of problem a validation issue describes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// A field has the wrong JSON type.
    InvalidType,
    /// A required field is missing or blank.
    MissingField,
    /// An enum field holds a value outside the vocabulary.
    UnknownValue,
    /// A numeric field is outside its allowed range.
    OutOfRange,
    /// Two rules in one list share an id.
    DuplicateRuleId,
    /// The same subject is both allowed and denied.
    AllowDenyConflict,
    /// A version string is malformed.
    InvalidVersion,
    /// A time range is malformed.
    InvalidTimeRange,
    /// Constraints do not fit the rule's decision.
    InconsistentConstraints,
    /// Two settings contradict each other.
    InconsistentSettings,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IssueKind::InvalidType => "invalid type",
            IssueKind::MissingField => "missing field",
            IssueKind::UnknownValue => "unknown value",
            IssueKind::OutOfRange => "out of range",
            IssueKind::DuplicateRuleId => "duplicate rule id",
            IssueKind::AllowDenyConflict => "allow/deny conflict",
            IssueKind::InvalidVersion => "invalid version",
            IssueKind::InvalidTimeRange => "invalid time range",
            IssueKind::InconsistentConstraints => "inconsistent constraints",
            IssueKind::InconsistentSettings => "inconsistent settings",
        };
        f.write_str(label)
    }
}

/// One problem found in a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationIssue {
    /// JSON path of the offending field, e.g. `tools.rules[2].id`.
    pub path: String,
    pub kind: IssueKind,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.path, self.message, self.kind)
    }
}

/// Validate an untyped document and convert it to the typed model.
pub fn parse_document(value: &Value, source: PolicySource) -> Result<PolicyDocument, PolicyError> {
    let issues = validate_value(value);
    if !issues.is_empty() {
        return Err(PolicyError::Validation {
            origin: source,
            issues,
        });
    }
    serde_json::from_value(value.clone()).map_err(|e| PolicyError::Validation {
        origin: source,
        issues: vec![ValidationIssue {
            path: "$".to_string(),
            kind: IssueKind::InvalidType,
            message: e.to_string(),
        }],
    })
}

/// Validate a typed document (e.g. one built in code for the Session source).
pub fn validate_document(doc: &PolicyDocument, source: PolicySource) -> Result<(), PolicyError> {
    let value = serde_json::to_value(doc)?;
    let issues = validate_value(&value);
    if issues.is_empty() {
        Ok(())
    } else {
        Err(PolicyError::Validation {
            origin: source,
            issues,
        })
    }
}

/// Run every check and return all issues found.
pub fn validate_value(value: &Value) -> Vec<ValidationIssue> {
    let mut v = Validator::default();
    let Some(root) = v.object(value, "$") else {
        return v.issues;
    };

    if let Some(version) = v.string(root, "version", "version") {
        if !is_valid_schema_version(version) {
            v.push(
                "version",
                IssueKind::InvalidVersion,
                format!("'{}' is not a MAJOR.MINOR[.PATCH] version", version),
            );
        }
    }
    v.boolean(root, "locked", "locked");

    if let Some(tools) = v.section(root, "tools") {
        v.check_tools(tools);
    }
    if let Some(plugins) = v.section(root, "plugins") {
        v.check_plugins(plugins);
    }
    if let Some(memory) = v.section(root, "memory") {
        v.check_memory(memory);
    }
    if let Some(connectivity) = v.section(root, "connectivity") {
        v.check_connectivity(connectivity);
    }
    if let Some(updates) = v.section(root, "updates") {
        v.check_updates(updates);
    }

    v.issues
}

const DEFAULT_DECISIONS: &[&str] = &["Allow", "Deny", "AllowWithApproval"];
const CONSTRAINT_KINDS: &[&str] = &[
    "rateLimit",
    "redactFields",
    "maxPayloadBytes",
    "readOnly",
    "timeout",
];

fn decision_vocabulary() -> Vec<&'static str> {
    DecisionKind::ALL.iter().map(|k| k.as_str()).collect()
}

fn risk_vocabulary() -> Vec<&'static str> {
    RiskLevel::ALL.iter().map(|r| r.as_str()).collect()
}

fn mode_vocabulary() -> Vec<&'static str> {
    ConnectivityMode::ALL.iter().map(|m| m.as_str()).collect()
}

fn channel_vocabulary() -> Vec<&'static str> {
    UpdateChannel::ALL.iter().map(|c| c.as_str()).collect()
}

#[derive(Default)]
struct Validator {
    issues: Vec<ValidationIssue>,
}

impl Validator {
    fn push(&mut self, path: impl Into<String>, kind: IssueKind, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            path: path.into(),
            kind,
            message: message.into(),
        });
    }

    // ── Typed field accessors (record a type issue and return None) ──

    fn object<'a>(&mut self, value: &'a Value, path: &str) -> Option<&'a Map<String, Value>> {
        match value.as_object() {
            Some(obj) => Some(obj),
            None => {
                self.push(path, IssueKind::InvalidType, "expected an object");
                None
            }
        }
    }

    fn section<'a>(
        &mut self,
        root: &'a Map<String, Value>,
        key: &str,
    ) -> Option<&'a Map<String, Value>> {
        match root.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => self.object(value, key),
        }
    }

    fn string<'a>(&mut self, obj: &'a Map<String, Value>, key: &str, path: &str) -> Option<&'a str> {
        match obj.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.as_str()),
            Some(_) => {
                self.push(path, IssueKind::InvalidType, "expected a string");
                None
            }
        }
    }

    fn required_string<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Option<&'a str> {
        match self.string(obj, key, path) {
            Some(s) if !s.trim().is_empty() => Some(s),
            Some(_) => {
                self.push(path, IssueKind::MissingField, "must not be blank");
                None
            }
            None if matches!(obj.get(key), None | Some(Value::Null)) => {
                self.push(path, IssueKind::MissingField, "is required");
                None
            }
            None => None,
        }
    }

    fn boolean(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> Option<bool> {
        match obj.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(_) => {
                self.push(path, IssueKind::InvalidType, "expected a boolean");
                None
            }
        }
    }

    fn bounded_int(
        &mut self,
        obj: &Map<String, Value>,
        key: &str,
        path: &str,
        min: u64,
        max: u64,
    ) -> Option<u64> {
        match obj.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => match value.as_u64() {
                Some(n) if n >= min && n <= max => Some(n),
                Some(n) => {
                    self.push(
                        path,
                        IssueKind::OutOfRange,
                        format!("{} is outside {}..={}", n, min, max),
                    );
                    None
                }
                None if value.is_number() => {
                    self.push(
                        path,
                        IssueKind::OutOfRange,
                        format!("{} is outside {}..={}", value, min, max),
                    );
                    None
                }
                None => {
                    self.push(path, IssueKind::InvalidType, "expected a non-negative integer");
                    None
                }
            },
        }
    }

    fn enum_value<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &str,
        vocabulary: &[&str],
    ) -> Option<&'a str> {
        let s = self.string(obj, key, path)?;
        if vocabulary.contains(&s) {
            Some(s)
        } else {
            self.push(
                path,
                IssueKind::UnknownValue,
                format!("'{}' is not one of [{}]", s, vocabulary.join(", ")),
            );
            None
        }
    }

    /// A list of strings. Non-string entries and blank entries are reported.
    fn string_list<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &str,
    ) -> Vec<&'a str> {
        let mut out = Vec::new();
        let items = match obj.get(key) {
            None | Some(Value::Null) => return out,
            Some(Value::Array(items)) => items,
            Some(_) => {
                self.push(path, IssueKind::InvalidType, "expected an array of strings");
                return out;
            }
        };
        for (i, item) in items.iter().enumerate() {
            let item_path = format!("{}[{}]", path, i);
            match item.as_str() {
                Some(s) if s.trim().is_empty() => {
                    self.push(item_path, IssueKind::MissingField, "must not be blank")
                }
                Some(s) => out.push(s),
                None => self.push(item_path, IssueKind::InvalidType, "expected a string"),
            }
        }
        out
    }

    fn enum_list<'a>(
        &mut self,
        obj: &'a Map<String, Value>,
        key: &str,
        path: &str,
        vocabulary: &[&str],
    ) -> Vec<&'a str> {
        let raw = self.string_list(obj, key, path);
        let mut out = Vec::new();
        for (i, s) in raw.into_iter().enumerate() {
            if vocabulary.contains(&s) {
                out.push(s);
            } else {
                self.push(
                    format!("{}[{}]", path, i),
                    IssueKind::UnknownValue,
                    format!("'{}' is not one of [{}]", s, vocabulary.join(", ")),
                );
            }
        }
        out
    }

    // ── Cross-field checks ──

    fn check_conflicts(&mut self, allow: &[&str], deny: &[&str], path: &str, what: &str) {
        let denied: HashSet<String> = deny.iter().map(|s| s.to_lowercase()).collect();
        let mut reported = HashSet::new();
        for entry in allow {
            let key = entry.to_lowercase();
            if denied.contains(&key) && reported.insert(key) {
                self.push(
                    path,
                    IssueKind::AllowDenyConflict,
                    format!("'{}' appears in both the {} allow and deny lists", entry, what),
                );
            }
        }
    }

    fn check_rules(&mut self, section: &Map<String, Value>, section_path: &str, subject_key: &str) {
        let items = match section.get("rules") {
            None | Some(Value::Null) => return,
            Some(Value::Array(items)) => items,
            Some(_) => {
                self.push(
                    format!("{}.rules", section_path),
                    IssueKind::InvalidType,
                    "expected an array of rules",
                );
                return;
            }
        };

        let decisions = decision_vocabulary();
        let mut seen: HashMap<String, usize> = HashMap::new();
        for (i, item) in items.iter().enumerate() {
            let path = format!("{}.rules[{}]", section_path, i);
            let Some(rule) = self.object(item, &path) else {
                continue;
            };

            if let Some(id) = self.required_string(rule, "id", &format!("{}.id", path)) {
                if let Some(first) = seen.insert(id.to_string(), i) {
                    self.push(
                        format!("{}.id", path),
                        IssueKind::DuplicateRuleId,
                        format!(
                            "rule id '{}' is already used by {}.rules[{}]",
                            id, section_path, first
                        ),
                    );
                }
            }
            self.required_string(rule, subject_key, &format!("{}.{}", path, subject_key));
            let decision = match rule.get("decision") {
                None | Some(Value::Null) => {
                    self.push(
                        format!("{}.decision", path),
                        IssueKind::MissingField,
                        "is required",
                    );
                    None
                }
                Some(_) => self.enum_value(rule, "decision", &format!("{}.decision", path), &decisions),
            };
            self.string(rule, "reason", &format!("{}.reason", path));

            let constraint_count = self.check_constraints(rule, &format!("{}.constraints", path));
            match (decision, constraint_count) {
                (Some("AllowWithConstraints"), 0) => self.push(
                    format!("{}.constraints", path),
                    IssueKind::InconsistentConstraints,
                    "AllowWithConstraints requires at least one constraint",
                ),
                (Some(d @ ("Deny" | "AllowWithApproval")), n) if n > 0 => self.push(
                    format!("{}.constraints", path),
                    IssueKind::InconsistentConstraints,
                    format!("constraints cannot be attached to a {} rule", d),
                ),
                _ => {}
            }

            match rule.get("conditions") {
                None | Some(Value::Null) => {}
                Some(value) => {
                    let cond_path = format!("{}.conditions", path);
                    if let Some(cond) = self.object(value, &cond_path) {
                        self.check_conditions(cond, &cond_path);
                    }
                }
            }
        }
    }

    /// Returns the number of constraint entries present (valid or not).
    fn check_constraints(&mut self, rule: &Map<String, Value>, path: &str) -> usize {
        let items = match rule.get("constraints") {
            None | Some(Value::Null) => return 0,
            Some(Value::Array(items)) => items,
            Some(_) => {
                self.push(path, IssueKind::InvalidType, "expected an array of constraints");
                return 0;
            }
        };
        for (i, item) in items.iter().enumerate() {
            let item_path = format!("{}[{}]", path, i);
            let Some(obj) = self.object(item, &item_path) else {
                continue;
            };
            let kind_path = format!("{}.kind", item_path);
            let kind = match obj.get("kind") {
                None | Some(Value::Null) => {
                    self.push(kind_path, IssueKind::MissingField, "is required");
                    continue;
                }
                Some(_) => self.enum_value(obj, "kind", &kind_path, CONSTRAINT_KINDS),
            };
            match kind {
                Some("rateLimit") => {
                    self.required_positive(obj, "maxCalls", &item_path, u32::MAX as u64);
                    self.required_positive(obj, "windowSecs", &item_path, u64::MAX);
                }
                Some("redactFields") => {
                    let fields_path = format!("{}.fields", item_path);
                    if self.string_list(obj, "fields", &fields_path).is_empty() {
                        self.push(
                            fields_path,
                            IssueKind::MissingField,
                            "at least one field name is required",
                        );
                    }
                }
                Some("maxPayloadBytes") => {
                    self.required_positive(obj, "bytes", &item_path, u64::MAX);
                }
                Some("timeout") => {
                    self.required_positive(obj, "secs", &item_path, u64::MAX);
                }
                _ => {}
            }
        }
        items.len()
    }

    fn required_positive(&mut self, obj: &Map<String, Value>, key: &str, parent: &str, max: u64) {
        let path = format!("{}.{}", parent, key);
        if matches!(obj.get(key), None | Some(Value::Null)) {
            self.push(path, IssueKind::MissingField, "is required");
            return;
        }
        self.bounded_int(obj, key, &path, 1, max);
    }

    fn check_conditions(&mut self, cond: &Map<String, Value>, path: &str) {
        let range_path = format!("{}.timeRange", path);
        if let Some(raw) = self.string(cond, "timeRange", &range_path) {
            if let Err(reason) = TimeRange::parse(raw) {
                self.push(range_path, IssueKind::InvalidTimeRange, reason);
            }
        }
        let days_path = format!("{}.daysOfWeek", path);
        match cond.get("daysOfWeek") {
            None | Some(Value::Null) => {}
            Some(Value::Array(days)) => {
                for (i, day) in days.iter().enumerate() {
                    match day.as_u64() {
                        Some(d) if d <= 6 => {}
                        Some(_) | None if day.is_number() => self.push(
                            format!("{}[{}]", days_path, i),
                            IssueKind::OutOfRange,
                            format!("{} is outside 0..=6", day),
                        ),
                        _ => self.push(
                            format!("{}[{}]", days_path, i),
                            IssueKind::InvalidType,
                            "expected an integer day of week",
                        ),
                    }
                }
            }
            Some(_) => self.push(days_path, IssueKind::InvalidType, "expected an array"),
        }
    }

    // ── Sections ──

    fn check_tools(&mut self, tools: &Map<String, Value>) {
        self.enum_value(tools, "default", "tools.default", DEFAULT_DECISIONS);
        let allow = self.string_list(tools, "allow", "tools.allow");
        let deny = self.string_list(tools, "deny", "tools.deny");
        self.string_list(tools, "requireApproval", "tools.requireApproval");
        self.check_conflicts(&allow, &deny, "tools", "tool");
        self.check_rules(tools, "tools", "tool");
    }

    fn check_plugins(&mut self, plugins: &Map<String, Value>) {
        self.boolean(plugins, "enabled", "plugins.enabled");
        self.enum_value(
            plugins,
            "maxRiskLevel",
            "plugins.maxRiskLevel",
            &risk_vocabulary(),
        );
        self.enum_value(plugins, "default", "plugins.default", DEFAULT_DECISIONS);
        let allow = self.string_list(plugins, "allow", "plugins.allow");
        let deny = self.string_list(plugins, "deny", "plugins.deny");
        self.string_list(plugins, "requireApproval", "plugins.requireApproval");
        self.string_list(plugins, "trustedAuthors", "plugins.trustedAuthors");
        self.check_conflicts(&allow, &deny, "plugins", "plugin");
        self.check_rules(plugins, "plugins", "plugin");
    }

    fn check_memory(&mut self, memory: &Map<String, Value>) {
        self.boolean(memory, "enabled", "memory.enabled");
        self.bounded_int(
            memory,
            "maxRetentionDays",
            "memory.maxRetentionDays",
            0,
            MAX_DAYS,
        );
        self.bounded_int(memory, "maxMemories", "memory.maxMemories", 0, MAX_MEMORIES);
        self.boolean(memory, "encryptAtRest", "memory.encryptAtRest");
        self.boolean(memory, "autoFormation", "memory.autoFormation");
        self.string_list(memory, "excludeCategories", "memory.excludeCategories");
        self.boolean(memory, "allowExport", "memory.allowExport");
        self.boolean(memory, "allowImport", "memory.allowImport");
    }

    fn check_connectivity(&mut self, conn: &Map<String, Value>) {
        let modes = mode_vocabulary();
        let allowed_modes = self.enum_list(conn, "allowedModes", "connectivity.allowedModes", &modes);
        let default_mode = self.enum_value(conn, "defaultMode", "connectivity.defaultMode", &modes);
        if let Some(mode) = default_mode {
            if !allowed_modes.is_empty() && !allowed_modes.contains(&mode) {
                self.push(
                    "connectivity.defaultMode",
                    IssueKind::InconsistentSettings,
                    format!("default mode '{}' is not in allowedModes", mode),
                );
            }
        }
        self.boolean(conn, "allowModeChange", "connectivity.allowModeChange");

        let allowed = self.string_list(conn, "allowedDomains", "connectivity.allowedDomains");
        let blocked = self.string_list(conn, "blockedDomains", "connectivity.blockedDomains");
        for (key, list) in [("allowedDomains", &allowed), ("blockedDomains", &blocked)] {
            for (i, domain) in list.iter().enumerate() {
                if domain.contains("://") || domain.contains('/') || domain.contains(char::is_whitespace) {
                    self.push(
                        format!("connectivity.{}[{}]", key, i),
                        IssueKind::UnknownValue,
                        format!("'{}' is not a bare domain name", domain),
                    );
                }
            }
        }
        self.check_conflicts(&allowed, &blocked, "connectivity", "domain");
        self.boolean(conn, "allowTelemetry", "connectivity.allowTelemetry");
    }

    fn check_updates(&mut self, updates: &Map<String, Value>) {
        let channels = channel_vocabulary();
        self.boolean(updates, "autoUpdate", "updates.autoUpdate");
        let allowed = self.enum_list(updates, "allowedChannels", "updates.allowedChannels", &channels);
        let required = self.enum_value(updates, "requiredChannel", "updates.requiredChannel", &channels);
        if let Some(required) = required {
            if !allowed.is_empty() && !allowed.contains(&required) {
                self.push(
                    "updates.requiredChannel",
                    IssueKind::InconsistentSettings,
                    format!("required channel '{}' is not in allowedChannels", required),
                );
            }
        }
        self.bounded_int(updates, "deferDays", "updates.deferDays", 0, MAX_DAYS);
        self.boolean(updates, "checkOnStartup", "updates.checkOnStartup");
        if let Some(raw) = self.string(updates, "minimumVersion", "updates.minimumVersion") {
            if Version::parse(raw).is_none() {
                self.push(
                    "updates.minimumVersion",
                    IssueKind::InvalidVersion,
                    format!("'{}' is not a semantic version", raw),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn kinds(issues: &[ValidationIssue]) -> Vec<IssueKind> {
        issues.iter().map(|i| i.kind).collect()
    }

    #[test]
    fn valid_document_parses() {
        let value = json!({
            "version": "1.0",
            "locked": true,
            "tools": {
                "default": "Deny",
                "allow": ["fs.read"],
                "deny": ["exec.*"],
                "rules": [{
                    "id": "r1", "tool": "net.*", "decision": "AllowWithConstraints",
                    "constraints": [{ "kind": "rateLimit", "maxCalls": 10, "windowSecs": 60 }],
                    "conditions": { "timeRange": "09:00-17:00", "daysOfWeek": [1, 2, 3] }
                }]
            },
            "memory": { "maxRetentionDays": 30, "excludeCategories": ["health"] },
            "updates": { "requiredChannel": "Stable", "allowedChannels": ["Stable", "Beta"], "minimumVersion": "2.1.0" }
        });
        let doc = parse_document(&value, PolicySource::Organization).unwrap();
        assert!(doc.locked);
        assert_eq!(doc.tools.rules.len(), 1);
        assert_eq!(doc.memory.max_retention_days, Some(30));
    }

    #[test]
    fn allow_deny_conflict_is_reported() {
        let value = json!({ "tools": { "allow": ["exec.shell"], "deny": ["EXEC.SHELL"] } });
        let err = parse_document(&value, PolicySource::User).unwrap_err();
        assert_eq!(kinds(err.issues()), vec![IssueKind::AllowDenyConflict]);
        assert!(err.issues()[0].message.contains("exec.shell"));
    }

    #[test]
    fn all_problems_are_reported_in_one_pass() {
        let value = json!({
            "version": "one",
            "tools": {
                "default": "Maybe",
                "rules": [
                    { "id": "dup", "tool": "a", "decision": "Allow" },
                    { "id": "dup", "tool": "b", "decision": "Deny", "constraints": [{ "kind": "readOnly" }] }
                ]
            },
            "memory": { "maxRetentionDays": 400 },
            "connectivity": { "defaultMode": "Sideways" },
            "updates": { "requiredChannel": "Canary", "minimumVersion": "1.x" }
        });
        let issues = validate_value(&value);
        let found = kinds(&issues);
        for expected in [
            IssueKind::InvalidVersion,
            IssueKind::UnknownValue,
            IssueKind::DuplicateRuleId,
            IssueKind::InconsistentConstraints,
            IssueKind::OutOfRange,
        ] {
            assert!(found.contains(&expected), "missing {:?} in {:?}", expected, issues);
        }
        // version + tools.default + dup id + constraints + retention + mode + channel + minimumVersion
        assert_eq!(issues.len(), 8, "{:#?}", issues);
    }

    #[test]
    fn rule_fields_are_required() {
        let value = json!({ "plugins": { "rules": [{ "id": " ", "decision": "Allow" }] } });
        let issues = validate_value(&value);
        let paths: Vec<&str> = issues.iter().map(|i| i.path.as_str()).collect();
        assert!(paths.contains(&"plugins.rules[0].id"));
        assert!(paths.contains(&"plugins.rules[0].plugin"));
    }

    #[test]
    fn condition_ranges_are_checked() {
        let value = json!({ "tools": { "rules": [{
            "id": "r", "tool": "x", "decision": "Allow",
            "conditions": { "timeRange": "25:00-01:00", "daysOfWeek": [0, 7] }
        }] } });
        let found = kinds(&validate_value(&value));
        assert!(found.contains(&IssueKind::InvalidTimeRange));
        assert!(found.contains(&IssueKind::OutOfRange));
    }

    #[test]
    fn constrained_allow_needs_constraints() {
        let value = json!({ "tools": { "rules": [{ "id": "r", "tool": "x", "decision": "AllowWithConstraints" }] } });
        assert_eq!(
            kinds(&validate_value(&value)),
            vec![IssueKind::InconsistentConstraints]
        );
    }

    #[test]
    fn wrong_types_are_reported() {
        let value = json!({ "locked": "yes", "tools": { "allow": "fs.read" }, "memory": { "maxMemories": -3 } });
        let found = kinds(&validate_value(&value));
        assert_eq!(
            found,
            vec![IssueKind::InvalidType, IssueKind::InvalidType, IssueKind::OutOfRange]
        );
    }

    #[test]
    fn typed_documents_use_the_same_checks() {
        let mut doc = PolicyDocument::default();
        doc.tools.allow.push("net.fetch".to_string());
        doc.tools.deny.push("net.fetch".to_string());
        let err = validate_document(&doc, PolicySource::Session).unwrap_err();
        assert_eq!(kinds(err.issues()), vec![IssueKind::AllowDenyConflict]);
    }

    #[test]
    fn non_object_root_is_rejected() {
        let issues = validate_value(&json!(["not", "a", "policy"]));
        assert_eq!(kinds(&issues), vec![IssueKind::InvalidType]);
    }
}
