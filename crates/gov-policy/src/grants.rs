// grants.rs — Session-scoped approvals.
//
// A grant turns an AllowWithApproval decision into Allow for one subject in
// one category. Grants live only in process memory: nothing here is ever
// written to disk, and a restart clears them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::source::PolicyCategory;

/// One in-memory approval.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionGrant {
    pub category: PolicyCategory,
    pub subject: String,
    pub granted_at: DateTime<Utc>,
    pub granted_by: String,
}

/// Grants keyed by (category, lowercased subject).
#[derive(Debug, Default)]
pub(crate) struct SessionGrants {
    grants: BTreeMap<(PolicyCategory, String), SessionGrant>,
}

fn key(category: PolicyCategory, subject: &str) -> (PolicyCategory, String) {
    (category, subject.trim().to_lowercase())
}

impl SessionGrants {
    /// Insert or refresh a grant. Returns true if it was new.
    pub(crate) fn grant(&mut self, grant: SessionGrant) -> bool {
        self.grants
            .insert(key(grant.category, &grant.subject), grant)
            .is_none()
    }

    pub(crate) fn revoke(&mut self, category: PolicyCategory, subject: &str) -> bool {
        self.grants.remove(&key(category, subject)).is_some()
    }

    /// Clear one category, or everything when `category` is None. Returns
    /// the number of grants removed.
    pub(crate) fn clear(&mut self, category: Option<PolicyCategory>) -> usize {
        let before = self.grants.len();
        match category {
            Some(c) => self.grants.retain(|(cat, _), _| *cat != c),
            None => self.grants.clear(),
        }
        before - self.grants.len()
    }

    pub(crate) fn get(&self, category: PolicyCategory, subject: &str) -> Option<&SessionGrant> {
        self.grants.get(&key(category, subject))
    }

    pub(crate) fn list(&self, category: Option<PolicyCategory>) -> Vec<SessionGrant> {
        self.grants
            .values()
            .filter(|g| category.map_or(true, |c| g.category == c))
            .cloned()
            .collect()
    }
}
