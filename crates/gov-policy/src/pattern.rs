// pattern.rs — Subject pattern matching with a compiled-regex cache.
//
// Three pattern shapes:
// - `*` alone matches every subject.
// - A glob containing `*` compiles to an anchored, case-insensitive regex in
//   which `*` also spans line breaks, so no subject can step around it.
// - Anything else is a case-insensitive exact match.
//
// Compiled regexes are cached by pattern string so repeated evaluations don't
// recompile. The cache is shared across evaluator threads behind an RwLock:
// lookups take the read lock, and only a miss takes the write lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use regex::Regex;

/// Engine-owned cache of compiled glob patterns.
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: RwLock<HashMap<String, Option<Arc<Regex>>>>,
}

impl PatternCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `subject` matches `pattern`.
    pub fn matches(&self, pattern: &str, subject: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        if !pattern.contains('*') {
            return pattern.to_lowercase() == subject.to_lowercase();
        }
        match self.compiled(pattern) {
            Some(re) => re.is_match(subject),
            // A glob that failed to compile never matches (fail-closed).
            None => false,
        }
    }

    /// First pattern in `patterns` that matches `subject`.
    pub fn first_match<'a>(&self, patterns: &'a [String], subject: &str) -> Option<&'a str> {
        patterns
            .iter()
            .find(|p| self.matches(p, subject))
            .map(String::as_str)
    }

    /// Number of distinct glob patterns compiled so far.
    pub fn len(&self) -> usize {
        self.compiled.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn compiled(&self, pattern: &str) -> Option<Arc<Regex>> {
        if let Ok(map) = self.compiled.read() {
            if let Some(entry) = map.get(pattern) {
                return entry.clone();
            }
        }

        let entry = match Regex::new(&glob_to_regex(pattern)) {
            Ok(re) => Some(Arc::new(re)),
            Err(e) => {
                tracing::warn!("pattern '{}' failed to compile: {}", pattern, e);
                None
            }
        };
        let mut map = self
            .compiled
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(pattern.to_string()).or_insert(entry).clone()
    }
}

/// Translate a `*` glob into an anchored, case-insensitive regex source.
/// Every character other than `*` is matched literally; `*` matches any run
/// of characters, newlines included.
pub fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    out.push_str("(?si)^");
    for (i, literal) in pattern.split('*').enumerate() {
        if i > 0 {
            out.push_str(".*");
        }
        out.push_str(&regex::escape(literal));
    }
    out.push('$');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_everything() {
        let cache = PatternCache::new();
        assert!(cache.matches("*", "anything.at.all"));
        assert!(cache.is_empty(), "bare star is never compiled");
    }

    #[test]
    fn glob_is_anchored_and_case_insensitive() {
        let cache = PatternCache::new();
        assert!(cache.matches("exec.*", "exec.shell"));
        assert!(cache.matches("exec.*", "EXEC.Shell"));
        assert!(!cache.matches("exec.*", "my.exec.shell"));
        assert!(cache.matches("*.fetch", "network.fetch"));
        assert!(!cache.matches("*.fetch", "network.fetcher"));
    }

    #[test]
    fn star_spans_line_breaks() {
        let cache = PatternCache::new();
        assert!(cache.matches("exec.*", "exec.sh\nell"));
        assert!(cache.matches("exec.*", "exec.\r\n"));
        assert!(cache.matches("*.fetch", "net\nwork.fetch"));
        assert!(!cache.matches("exec.*", "\nexec.shell"));
        assert_eq!(glob_to_regex("a*b"), "(?si)^a.*b$");
    }

    #[test]
    fn dots_are_literal() {
        let cache = PatternCache::new();
        assert!(!cache.matches("fs.*", "fsXread"));
    }

    #[test]
    fn exact_patterns_ignore_case() {
        let cache = PatternCache::new();
        assert!(cache.matches("Network.Fetch", "network.fetch"));
        assert!(!cache.matches("network.fetch", "network.fetch2"));
    }

    #[test]
    fn compiled_patterns_are_cached_once() {
        let cache = PatternCache::new();
        for _ in 0..5 {
            cache.matches("a*b", "axxb");
            cache.matches("c*", "cat");
        }
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn first_match_returns_pattern() {
        let cache = PatternCache::new();
        let patterns = vec!["fs.write".to_string(), "fs.*".to_string()];
        assert_eq!(cache.first_match(&patterns, "fs.read"), Some("fs.*"));
        assert_eq!(cache.first_match(&patterns, "net.get"), None);
    }

    #[test]
    fn concurrent_lookups_share_cache() {
        let cache = Arc::new(PatternCache::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        assert!(cache.matches("tool.*", &format!("tool.{}", i)));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 1);
    }
}
