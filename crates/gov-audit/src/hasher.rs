// hasher.rs — SHA-256 hashing for the journal chain and policy fingerprints.
//
// Hashes are lowercase hex SHA-256 (64 characters).

use sha2::{Digest, Sha256};
use std::path::Path;

use crate::error::AuditError;

pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}

/// Fingerprint a policy file so operators can tell which revision is loaded.
pub fn hash_file(path: &Path) -> Result<String, AuditError> {
    let data = std::fs::read(path).map_err(|source| AuditError::HashFileFailed {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(hash_bytes(&data))
}

/// First 12 hex characters, for display.
pub fn short(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
