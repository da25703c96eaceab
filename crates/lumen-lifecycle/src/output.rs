//! Durable output persistence.
//!
//! A success is not fully resolved until the output reference has been
//! written to durable storage. A persistence failure degrades the job to a
//! distinguished semi-failure awaiting a manual retry, never a silent loss.

use std::path::PathBuf;

use async_trait::async_trait;
use lumen_models::GenerationJob;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
#[error("Output store error: {0}")]
pub struct OutputError(pub String);

impl OutputError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type OutputResult<T> = Result<T, OutputError>;

/// Durable storage for generation results.
#[async_trait]
pub trait OutputStore: Send + Sync {
    /// Persist the provider output durably. Returns the durable reference
    /// the presentation layer should use from now on.
    async fn persist(&self, job: &GenerationJob, output_ref: &str) -> OutputResult<String>;
}

/// Filesystem-backed output store.
///
/// HTTP output references are downloaded into the store directory; other
/// references are recorded as pointer files for the media pipeline to
/// resolve.
pub struct FsOutputStore {
    dir: PathBuf,
    http: reqwest::Client,
}

impl FsOutputStore {
    /// Create a store rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn ensure_dir(&self) -> OutputResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| OutputError::new(format!("create output dir: {e}")))
    }
}

#[async_trait]
impl OutputStore for FsOutputStore {
    async fn persist(&self, job: &GenerationJob, output_ref: &str) -> OutputResult<String> {
        self.ensure_dir().await?;

        let path = if output_ref.starts_with("http://") || output_ref.starts_with("https://") {
            let ext = match job.kind {
                lumen_models::GenerationKind::Photo => "png",
                lumen_models::GenerationKind::Video => "mp4",
            };
            let path = self.dir.join(format!("{}.{}", job.local_id, ext));

            debug!(local_id = %job.local_id, "Downloading generation output");
            let response = self
                .http
                .get(output_ref)
                .send()
                .await
                .map_err(|e| OutputError::new(format!("download output: {e}")))?;
            if !response.status().is_success() {
                return Err(OutputError::new(format!(
                    "download output: HTTP {}",
                    response.status()
                )));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| OutputError::new(format!("read output body: {e}")))?;
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(|e| OutputError::new(format!("write output: {e}")))?;
            path
        } else {
            let path = self.dir.join(format!("{}.ref.json", job.local_id));
            let pointer = serde_json::json!({
                "local_id": job.local_id,
                "output_ref": output_ref,
            });
            tokio::fs::write(&path, pointer.to_string())
                .await
                .map_err(|e| OutputError::new(format!("write output pointer: {e}")))?;
            path
        };

        info!(local_id = %job.local_id, path = %path.display(), "Persisted generation output");
        Ok(path.to_string_lossy().into_owned())
    }
}

/// In-memory output store for tests.
#[derive(Default)]
pub struct MemoryOutputStore {
    persisted: std::sync::Mutex<Vec<(String, String)>>,
    fail: std::sync::atomic::AtomicBool,
}

impl MemoryOutputStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent persists fail (semi-failure path testing).
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// References persisted so far, in order.
    pub fn persisted(&self) -> Vec<(String, String)> {
        self.persisted.lock().expect("output store lock poisoned").clone()
    }
}

#[async_trait]
impl OutputStore for MemoryOutputStore {
    async fn persist(&self, job: &GenerationJob, output_ref: &str) -> OutputResult<String> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(OutputError::new("simulated persistence failure"));
        }
        let durable = format!("local://{}", job.local_id);
        self.persisted
            .lock()
            .expect("output store lock poisoned")
            .push((job.local_id.to_string(), output_ref.to_string()));
        Ok(durable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_models::{GenerationKind, UserKey};
    use tempfile::TempDir;

    fn job() -> GenerationJob {
        GenerationJob::new(
            GenerationKind::Photo,
            UserKey::anonymous("device-1"),
            "media://in/1",
        )
    }

    #[tokio::test]
    async fn test_fs_store_writes_pointer_for_opaque_refs() {
        let dir = TempDir::new().unwrap();
        let store = FsOutputStore::new(dir.path());
        let job = job();

        let durable = store.persist(&job, "asset://render/123").await.unwrap();
        let contents = tokio::fs::read_to_string(&durable).await.unwrap();
        assert!(contents.contains("asset://render/123"));
    }

    #[tokio::test]
    async fn test_memory_store_failure_switch() {
        let store = MemoryOutputStore::new();
        let job = job();

        store.set_failing(true);
        assert!(store.persist(&job, "media://out/1").await.is_err());

        store.set_failing(false);
        let durable = store.persist(&job, "media://out/1").await.unwrap();
        assert!(durable.starts_with("local://"));
        assert_eq!(store.persisted().len(), 1);
    }
}
