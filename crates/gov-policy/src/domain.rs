// domain.rs — Domain suffix matching.
//
// "ads.example" covers "ads.example" and every sub-domain ("x.ads.example")
// but not look-alikes such as "badads.example". Comparison is
// case-insensitive and ignores a trailing root dot.

/// Lowercase and strip a trailing `.` and a leading `*.` wildcard label.
pub fn normalize_domain(domain: &str) -> String {
    let d = domain.trim().trim_end_matches('.').to_lowercase();
    match d.strip_prefix("*.") {
        Some(rest) => rest.to_string(),
        None => d,
    }
}

/// Whether `domain` equals `entry` or is a sub-domain of it.
pub fn domain_matches(domain: &str, entry: &str) -> bool {
    let domain = normalize_domain(domain);
    let entry = normalize_domain(entry);
    if entry.is_empty() {
        return false;
    }
    domain == entry
        || (domain.len() > entry.len()
            && domain.ends_with(&entry)
            && domain.as_bytes()[domain.len() - entry.len() - 1] == b'.')
}

/// The first entry in `entries` covering `domain`.
pub fn find_covering<'a, I>(domain: &str, entries: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    entries
        .into_iter()
        .find(|entry| domain_matches(domain, entry))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_subdomains_match() {
        assert!(domain_matches("ads.example", "ads.example"));
        assert!(domain_matches("sub.ads.example", "ads.example"));
        assert!(domain_matches("a.b.ads.example", "ads.example"));
    }

    #[test]
    fn lookalikes_do_not_match() {
        assert!(!domain_matches("badads.example", "ads.example"));
        assert!(!domain_matches("example", "ads.example"));
        assert!(!domain_matches("ads.example.com", "ads.example"));
    }

    #[test]
    fn normalization() {
        assert!(domain_matches("Sub.ADS.example.", "ads.example"));
        assert!(domain_matches("x.tracker.io", "*.tracker.io"));
        assert!(!domain_matches("anything", ""));
    }

    #[test]
    fn find_covering_returns_entry() {
        let entries = vec!["evil.com".to_string(), "tracker.io".to_string()];
        assert_eq!(find_covering("cdn.tracker.io", &entries), Some("tracker.io"));
        assert_eq!(find_covering("good.org", &entries), None);
    }
}
