// journal.rs — Append-only JSONL journal of policy audit entries.
//
// The engine keeps a bounded in-memory audit log; the journal is its durable
// companion. One JSON object per line, each carrying the hash of the previous
// line so that inserting, deleting, or editing a record breaks the chain.
//
// `JournalObserver` plugs the journal into an engine as an AuditObserver, so
// every entry the engine records is also persisted in the same order.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use gov_policy::{AuditEntry, AuditObserver};

use crate::error::AuditError;
use crate::hasher;

/// One persisted line: the audit entry plus its chain link.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    #[serde(flatten)]
    pub entry: AuditEntry,
    /// Hash of the previous line (None for the first record).
    pub previous_hash: Option<String>,
}

/// An append-only journal backed by a JSONL file.
pub struct AuditJournal {
    writer: BufWriter<File>,
    path: PathBuf,
    last_hash: Option<String>,
    appended: usize,
}

impl AuditJournal {
    /// Open (or create) a journal. An existing file's last line seeds the
    /// hash chain so new records link correctly.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;
        }

        let last_hash = if path.exists() {
            read_last_hash(&path)?
        } else {
            None
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            writer: BufWriter::new(file),
            path,
            last_hash,
            appended: 0,
        })
    }

    /// Append an entry, linking it to the previous record. Flushed after
    /// every write.
    pub fn append(&mut self, entry: &AuditEntry) -> Result<(), AuditError> {
        let record = AuditRecord {
            entry: entry.clone(),
            previous_hash: self.last_hash.clone(),
        };
        let json = serde_json::to_string(&record)?;
        writeln!(self.writer, "{}", json)?;
        self.writer.flush()?;
        self.last_hash = Some(hasher::hash_str(&json));
        self.appended += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle (not counting earlier sessions).
    pub fn appended(&self) -> usize {
        self.appended
    }

    /// Read every record, oldest first. Blank lines are skipped.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>, AuditError> {
        let mut records = Vec::new();
        for_each_line(path.as_ref(), |line_num, line| {
            let record: AuditRecord = serde_json::from_str(line)
                .map_err(|source| AuditError::MalformedRecord {
                    line: line_num,
                    source,
                })?;
            records.push(record);
            Ok(())
        })?;
        Ok(records)
    }

    /// The newest `n` records, oldest first.
    pub fn tail(path: impl AsRef<Path>, n: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let mut records = Self::read_all(path)?;
        let skip = records.len().saturating_sub(n);
        Ok(records.split_off(skip))
    }

    /// Verify the hash chain. Returns the number of records checked.
    ///
    /// Each record's `previous_hash` must equal the hash of the raw
    /// preceding line (not a re-serialization, whose field order may differ).
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<usize, AuditError> {
        let mut previous_hash: Option<String> = None;
        let mut count = 0;
        for_each_line(path.as_ref(), |line_num, line| {
            let record: AuditRecord = serde_json::from_str(line)
                .map_err(|source| AuditError::MalformedRecord {
                    line: line_num,
                    source,
                })?;
            if record.previous_hash != previous_hash {
                return Err(AuditError::IntegrityViolation {
                    line: line_num,
                    expected: previous_hash.clone().unwrap_or_else(|| "None".to_string()),
                    actual: record.previous_hash.unwrap_or_else(|| "None".to_string()),
                });
            }
            previous_hash = Some(hasher::hash_str(line));
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }
}

/// Call `f(line_number, line)` for every non-blank line. Line numbers are
/// 1-based.
fn for_each_line(
    path: &Path,
    mut f: impl FnMut(usize, &str) -> Result<(), AuditError>,
) -> Result<(), AuditError> {
    let file = File::open(path).map_err(|source| AuditError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        f(i + 1, &line)?;
    }
    Ok(())
}

fn read_last_hash(path: &Path) -> Result<Option<String>, AuditError> {
    let mut last_line: Option<String> = None;
    for_each_line(path, |_, line| {
        last_line = Some(line.to_string());
        Ok(())
    })?;
    Ok(last_line.map(|line| hasher::hash_str(&line)))
}

/// Persists every engine audit entry to a journal.
///
/// Write failures are logged and never interrupt policy evaluation.
pub struct JournalObserver {
    journal: Mutex<AuditJournal>,
}

impl JournalObserver {
    pub fn new(journal: AuditJournal) -> Self {
        Self {
            journal: Mutex::new(journal),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        Ok(Self::new(AuditJournal::open(path)?))
    }
}

impl AuditObserver for JournalObserver {
    fn on_entry(&self, entry: &AuditEntry) {
        let mut journal = self
            .journal
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = journal.append(entry) {
            tracing::warn!(
                path = %journal.path().display(),
                error = %e,
                "failed to persist audit entry"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gov_policy::{DecisionKind, PolicyCategory, PolicySource};
    use tempfile::tempdir;

    fn entry(subject: &str, decision: DecisionKind) -> AuditEntry {
        AuditEntry::new(
            PolicyCategory::Tools,
            subject,
            "execute",
            decision,
            "test",
            PolicySource::Organization,
        )
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let mut journal = AuditJournal::open(&path).unwrap();
            journal.append(&entry("fs.read", DecisionKind::Allow)).unwrap();
            journal.append(&entry("exec.sh", DecisionKind::Deny)).unwrap();
            assert_eq!(journal.appended(), 2);
        }
        let records = AuditJournal::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].previous_hash.is_none());
        assert!(records[1].previous_hash.is_some());
        assert_eq!(records[1].entry.subject, "exec.sh");
        assert_eq!(records[1].entry.decision, DecisionKind::Deny);
    }

    #[test]
    fn reopening_continues_the_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");
        for i in 0..3 {
            let mut journal = AuditJournal::open(&path).unwrap();
            journal
                .append(&entry(&format!("tool.{}", i), DecisionKind::Allow))
                .unwrap();
        }
        assert_eq!(AuditJournal::verify_chain(&path).unwrap(), 3);
    }

    #[test]
    fn tampering_breaks_the_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        {
            let mut journal = AuditJournal::open(&path).unwrap();
            for i in 0..3 {
                journal
                    .append(&entry(&format!("tool.{}", i), DecisionKind::Deny))
                    .unwrap();
            }
        }
        let content = std::fs::read_to_string(&path).unwrap();
        let edited = content.replacen("\"Deny\"", "\"Allow\"", 1);
        std::fs::write(&path, edited).unwrap();

        match AuditJournal::verify_chain(&path) {
            Err(AuditError::IntegrityViolation { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected integrity violation, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn tail_returns_newest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut journal = AuditJournal::open(&path).unwrap();
        for i in 0..5 {
            journal
                .append(&entry(&format!("tool.{}", i), DecisionKind::Allow))
                .unwrap();
        }
        let tail = AuditJournal::tail(&path, 2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].entry.subject, "tool.3");
    }

    #[test]
    fn malformed_line_is_reported_with_its_number() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        std::fs::write(&path, "not json\n").unwrap();
        assert!(matches!(
            AuditJournal::read_all(&path),
            Err(AuditError::MalformedRecord { line: 1, .. })
        ));
    }
}
