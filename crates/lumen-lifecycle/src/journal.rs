//! Local job journal for crash recovery.
//!
//! One JSON file per outstanding job, keyed by the local id, holding the
//! minimal resumable state: provider job id, owner key, kind, and
//! submission time. The record is written synchronously and fully — temp
//! file then rename — before the submission is acknowledged to the caller,
//! so a process kill immediately after submission either has the whole
//! record or none of it, never a half-written one. Entries are removed on
//! terminal resolution; the recovery manager is the only startup reader.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use lumen_models::{GenerationJob, GenerationKind, JobId, LocalJobId, UserKey};

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("Journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Journal serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type JournalResult<T> = Result<T, JournalError>;

/// Minimal resumable state for one outstanding job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Local-only key for this entry.
    pub local_id: LocalJobId,
    /// Provider job id. Still a placeholder if submission never completed
    /// (a ghost: no provider-side resource exists, but quota was reserved).
    pub provider_job_id: JobId,
    /// Usage record key the job reserved quota against.
    pub owner_key: UserKey,
    /// Kind of media being generated.
    pub kind: GenerationKind,
    /// Original submission time. Wall-clock timeouts run from here,
    /// including time spent suspended.
    pub submitted_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Capture the resumable state of a job.
    pub fn from_job(job: &GenerationJob) -> Self {
        Self {
            local_id: job.local_id.clone(),
            provider_job_id: job.job_id.clone(),
            owner_key: job.owner_key.clone(),
            kind: job.kind,
            submitted_at: job.submitted_at,
        }
    }

    /// Whether this entry references a provider id that was never assigned.
    pub fn is_ghost(&self) -> bool {
        self.provider_job_id.is_placeholder()
    }

    /// Age of the entry relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.submitted_at
    }
}

/// On-disk journal of outstanding jobs.
pub struct JobJournal {
    dir: PathBuf,
}

impl JobJournal {
    /// Create a journal rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Journal directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, local_id: &LocalJobId) -> PathBuf {
        self.dir.join(format!("{}.job.json", local_id))
    }

    fn ensure_dir(&self) -> JournalResult<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Persist an entry. Synchronous by design: the caller must not
    /// acknowledge the submission until this returns.
    pub fn record(&self, entry: &JournalEntry) -> JournalResult<()> {
        self.ensure_dir()?;

        let path = self.entry_path(&entry.local_id);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_vec_pretty(entry)?;

        let mut file = File::create(&tmp)?;
        file.write_all(&payload)?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;

        debug!(local_id = %entry.local_id, "Recorded journal entry");
        Ok(())
    }

    /// Remove an entry on terminal resolution. Missing entries are fine.
    pub fn remove(&self, local_id: &LocalJobId) -> JournalResult<()> {
        match fs::remove_file(self.entry_path(local_id)) {
            Ok(()) => {
                debug!(local_id = %local_id, "Removed journal entry");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// List all persisted entries. Unparseable files are skipped with a
    /// warning rather than blocking recovery of the rest.
    pub fn list(&self) -> JournalResult<Vec<JournalEntry>> {
        let mut entries = Vec::new();

        let dir = match fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };

        for item in dir {
            let path = item?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if path.to_string_lossy().ends_with(".tmp") {
                continue;
            }
            match fs::read(&path).map_err(JournalError::from).and_then(|bytes| {
                serde_json::from_slice::<JournalEntry>(&bytes).map_err(JournalError::from)
            }) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable journal entry");
                }
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry() -> JournalEntry {
        JournalEntry {
            local_id: LocalJobId::new(),
            provider_job_id: JobId::from_string("gen-42"),
            owner_key: UserKey::purchase("t1"),
            kind: GenerationKind::Video,
            submitted_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_then_list_roundtrip() {
        let dir = TempDir::new().unwrap();
        let journal = JobJournal::new(dir.path());
        let entry = entry();

        journal.record(&entry).unwrap();
        let listed = journal.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].local_id, entry.local_id);
        assert_eq!(listed[0].provider_job_id, entry.provider_job_id);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let journal = JobJournal::new(dir.path());
        let entry = entry();

        journal.record(&entry).unwrap();
        journal.remove(&entry.local_id).unwrap();
        journal.remove(&entry.local_id).unwrap();
        assert!(journal.list().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_entry_is_skipped() {
        let dir = TempDir::new().unwrap();
        let journal = JobJournal::new(dir.path());
        journal.record(&entry()).unwrap();

        fs::write(dir.path().join("broken.job.json"), b"not json").unwrap();
        assert_eq!(journal.list().unwrap().len(), 1);
    }

    #[test]
    fn test_ghost_detection() {
        let mut ghost = entry();
        ghost.provider_job_id = JobId::placeholder();
        assert!(ghost.is_ghost());
        assert!(!entry().is_ghost());
    }
}
