//! Storage abstraction for usage records.
//!
//! The store exposes versioned conditional updates: every read returns an
//! opaque version token, and every write names the version it read. A write
//! against a stale version fails with [`StoreError::PreconditionFailed`],
//! which is what makes the ledger's check-and-reserve a single atomic
//! conditional update rather than a read-modify-write race. Callers may be
//! on different devices, so no in-process lock is sufficient.

use async_trait::async_trait;
use lumen_models::{UsageRecord, UserKey};
use thiserror::Error;

use crate::audit::UsageEvent;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Record already exists: {0}")]
    Conflict(String),

    #[error("Precondition failed (concurrent update)")]
    PreconditionFailed,

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Check if this error is a failed write precondition.
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, StoreError::PreconditionFailed)
    }

    /// Check if this error is a create-time conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// A usage record together with its opaque store version token.
#[derive(Debug, Clone)]
pub struct VersionedRecord {
    pub record: UsageRecord,
    pub version: String,
}

/// Backing store for usage records and the usage audit trail.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load the record for a key, with its current version token.
    async fn get(&self, key: &UserKey) -> StoreResult<Option<VersionedRecord>>;

    /// Create a record. Fails with [`StoreError::Conflict`] if one already
    /// exists for the key.
    async fn insert(&self, record: UsageRecord) -> StoreResult<()>;

    /// Replace the record for `record.user_key`, conditional on the stored
    /// version still being `expected_version`. Fails with
    /// [`StoreError::PreconditionFailed`] if another writer got there first.
    async fn update(&self, record: UsageRecord, expected_version: &str) -> StoreResult<()>;

    /// Append a usage audit event. Best-effort; callers must not block the
    /// reservation path on this.
    async fn append_event(&self, event: UsageEvent) -> StoreResult<()>;

    /// List audit events for a key, newest first.
    async fn list_events(&self, key: &UserKey) -> StoreResult<Vec<UsageEvent>>;
}
