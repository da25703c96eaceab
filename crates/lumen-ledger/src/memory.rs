//! In-memory ledger store.
//!
//! Backs tests and local builds with the same versioned-conditional-update
//! contract a remote store provides. Version tokens are monotonically
//! increasing counters, so a stale writer always observes a precondition
//! failure rather than clobbering a concurrent update.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use lumen_models::{UsageRecord, UserKey};

use crate::audit::UsageEvent;
use crate::store::{LedgerStore, StoreError, StoreResult, VersionedRecord};

#[derive(Default)]
struct Inner {
    records: HashMap<UserKey, (UsageRecord, u64)>,
    events: Vec<UsageEvent>,
    next_version: u64,
}

/// In-memory [`LedgerStore`] implementation.
#[derive(Default)]
pub struct MemoryLedgerStore {
    inner: Mutex<Inner>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot a record without its version, for test assertions.
    pub fn snapshot(&self, key: &UserKey) -> Option<UsageRecord> {
        let inner = self.inner.lock().expect("ledger store lock poisoned");
        inner.records.get(key).map(|(record, _)| record.clone())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get(&self, key: &UserKey) -> StoreResult<Option<VersionedRecord>> {
        let inner = self.inner.lock().expect("ledger store lock poisoned");
        Ok(inner.records.get(key).map(|(record, version)| VersionedRecord {
            record: record.clone(),
            version: version.to_string(),
        }))
    }

    async fn insert(&self, record: UsageRecord) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("ledger store lock poisoned");
        if inner.records.contains_key(&record.user_key) {
            return Err(StoreError::Conflict(record.user_key.to_string()));
        }
        inner.next_version += 1;
        let version = inner.next_version;
        inner.records.insert(record.user_key.clone(), (record, version));
        Ok(())
    }

    async fn update(&self, record: UsageRecord, expected_version: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("ledger store lock poisoned");
        let current = inner
            .records
            .get(&record.user_key)
            .ok_or_else(|| StoreError::NotFound(record.user_key.to_string()))?;

        if current.1.to_string() != expected_version {
            return Err(StoreError::PreconditionFailed);
        }

        inner.next_version += 1;
        let version = inner.next_version;
        inner.records.insert(record.user_key.clone(), (record, version));
        Ok(())
    }

    async fn append_event(&self, event: UsageEvent) -> StoreResult<()> {
        let mut inner = self.inner.lock().expect("ledger store lock poisoned");
        inner.events.push(event);
        Ok(())
    }

    async fn list_events(&self, key: &UserKey) -> StoreResult<Vec<UsageEvent>> {
        let inner = self.inner.lock().expect("ledger store lock poisoned");
        let mut events: Vec<UsageEvent> = inner
            .events
            .iter()
            .filter(|e| &e.user_key == key)
            .cloned()
            .collect();
        events.reverse();
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use lumen_models::{CycleInfo, PlanTier};

    fn record(key: &UserKey) -> UsageRecord {
        let now = Utc::now();
        UsageRecord::new(
            key.clone(),
            &CycleInfo {
                plan: PlanTier::Monthly,
                usage_limit: 150,
                cycle_anchor: now,
                next_reset_at: now + Duration::days(30),
                cycle_token: Some("txn-1".into()),
            },
        )
    }

    #[tokio::test]
    async fn test_insert_then_get_returns_version() {
        let store = MemoryLedgerStore::new();
        let key = UserKey::purchase("t1");
        store.insert(record(&key)).await.unwrap();

        let versioned = store.get(&key).await.unwrap().unwrap();
        assert_eq!(versioned.record.user_key, key);
        assert!(!versioned.version.is_empty());
    }

    #[tokio::test]
    async fn test_double_insert_conflicts() {
        let store = MemoryLedgerStore::new();
        let key = UserKey::purchase("t1");
        store.insert(record(&key)).await.unwrap();
        let err = store.insert(record(&key)).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_stale_version_fails_precondition() {
        let store = MemoryLedgerStore::new();
        let key = UserKey::purchase("t1");
        store.insert(record(&key)).await.unwrap();

        let stale = store.get(&key).await.unwrap().unwrap();

        // A concurrent writer commits first.
        let mut winner = stale.record.clone();
        winner.consumed_count = 1;
        store.update(winner, &stale.version).await.unwrap();

        // The stale writer must now fail.
        let mut loser = stale.record.clone();
        loser.consumed_count = 1;
        let err = store.update(loser, &stale.version).await.unwrap_err();
        assert!(err.is_precondition_failed());
    }
}
