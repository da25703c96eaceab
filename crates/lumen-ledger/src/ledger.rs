//! Quota ledger with atomic check-and-reserve.
//!
//! A generation job can take one to five minutes, so a naive client-side
//! "check then increment" is exploitable by concurrent submissions from two
//! devices signed into the same account. The reservation therefore commits
//! atomically at submission time, before the expensive provider call, via
//! the store's versioned conditional update, and is rolled back only on a
//! confirmed failure — never on ambiguous outcomes.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use lumen_models::{CycleInfo, UsageRecord, UserKey};

use crate::audit::{UsageAction, UsageEvent};
use crate::error::{LedgerError, LedgerResult};
use crate::metrics;
use crate::store::{LedgerStore, StoreError};

/// Maximum attempts for atomic ledger operations (optimistic locking).
const MAX_LEDGER_RETRIES: u32 = 5;

/// Base delay for backoff on precondition-failure retry (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 50;

/// Timeout for background audit event recording.
const AUDIT_RECORD_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-user quota ledger.
#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn LedgerStore>,
}

impl QuotaLedger {
    /// Create a new ledger over a backing store.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Atomically check quota and reserve one generation unit.
    ///
    /// In one conditional update: load or create the record for `key`;
    /// reset it if `cycle` signals a new billing cycle (new token, absent
    /// stored token, or clock rollover); enforce the daily sub-limit and
    /// the cycle limit; then increment and commit. Two simultaneous callers
    /// cannot both observe capacity and both commit beyond the limit — the
    /// loser's write fails its precondition and retries against the fresh
    /// count.
    ///
    /// # Returns
    /// * `Ok(record)` - snapshot after the committed increment
    /// * `Err(CycleLimitReached | DailyLimitReached)` - denied, nothing committed
    /// * `Err(Contention)` - concurrent updates exhausted the retries
    pub async fn check_and_reserve(
        &self,
        key: &UserKey,
        cycle: &CycleInfo,
    ) -> LedgerResult<UsageRecord> {
        let mut last_error: Option<StoreError> = None;

        for attempt in 0..MAX_LEDGER_RETRIES {
            match self.try_reserve(key, cycle).await {
                Ok(record) => {
                    info!(
                        user_key = %key,
                        consumed = record.consumed_count,
                        limit = record.usage_limit,
                        "Reserved generation unit"
                    );
                    metrics::record_reservation("reserved");
                    self.record_event(key, UsageAction::Reserve, record.consumed_count);
                    return Ok(record);
                }
                Err(LedgerError::Store(e)) if e.is_precondition_failed() || e.is_conflict() => {
                    debug!(
                        user_key = %key,
                        attempt = attempt + 1,
                        "Reservation precondition failed, retrying"
                    );
                    metrics::record_retry("reserve");
                    last_error = Some(e);
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => {
                    if e.is_denied() {
                        metrics::record_reservation("denied");
                        debug!(user_key = %key, reason = %e, "Reservation denied");
                    } else {
                        metrics::record_reservation("error");
                        warn!(user_key = %key, error = %e, "Failed to reserve generation unit");
                    }
                    return Err(e);
                }
            }
        }

        warn!(
            user_key = %key,
            retries = MAX_LEDGER_RETRIES,
            error = ?last_error,
            "Reservation failed after retries"
        );
        metrics::record_reservation("contention");
        Err(LedgerError::Contention)
    }

    /// One conditional-update attempt of the reservation.
    async fn try_reserve(&self, key: &UserKey, cycle: &CycleInfo) -> LedgerResult<UsageRecord> {
        let now = Utc::now();
        let today = now.date_naive();

        match self.store.get(key).await? {
            None => {
                // First reservation ever for this key.
                let mut record = UsageRecord::new(key.clone(), cycle);
                if record.consumed_count >= record.usage_limit {
                    return Err(LedgerError::CycleLimitReached {
                        used: record.consumed_count,
                        limit: record.usage_limit,
                    });
                }
                record.consumed_count = 1;
                record.last_use_date = Some(today);
                record.updated_at = now;
                self.store.insert(record.clone()).await?;
                Ok(record)
            }
            Some(versioned) => {
                let mut record = versioned.record;

                if record.needs_reset(cycle, now) {
                    // Count, last-use date, and cycle fields change in one
                    // committed write; a failed precondition discards all
                    // of them together.
                    record.apply_reset(cycle, now);
                }

                if record.plan.daily_limited() && record.last_use_date == Some(today) {
                    return Err(LedgerError::DailyLimitReached);
                }

                if !record.is_unlimited() && record.consumed_count >= record.usage_limit {
                    return Err(LedgerError::CycleLimitReached {
                        used: record.consumed_count,
                        limit: record.usage_limit,
                    });
                }

                record.consumed_count = record.consumed_count.saturating_add(1);
                record.last_use_date = Some(today);
                record.updated_at = now;
                self.store.update(record.clone(), &versioned.version).await?;
                Ok(record)
            }
        }
    }

    /// Reverse the most recent reservation after a confirmed failure or
    /// cancellation. Floors at zero: a rollback with no matching prior
    /// reservation is a no-op (`Ok(false)`), not an error, so a double
    /// rollback never double-credits.
    pub async fn rollback(&self, key: &UserKey) -> LedgerResult<bool> {
        let mut last_error: Option<StoreError> = None;

        for attempt in 0..MAX_LEDGER_RETRIES {
            let versioned = match self.store.get(key).await? {
                Some(v) => v,
                None => {
                    metrics::record_rollback(false);
                    return Ok(false);
                }
            };

            let mut record = versioned.record;
            if record.consumed_count == 0 {
                metrics::record_rollback(false);
                return Ok(false);
            }

            record.consumed_count -= 1;
            record.updated_at = Utc::now();
            let consumed_after = record.consumed_count;

            match self.store.update(record, &versioned.version).await {
                Ok(()) => {
                    info!(
                        user_key = %key,
                        consumed = consumed_after,
                        "Rolled back reservation"
                    );
                    metrics::record_rollback(true);
                    self.record_event(key, UsageAction::Rollback, consumed_after);
                    return Ok(true);
                }
                Err(e) if e.is_precondition_failed() => {
                    debug!(
                        user_key = %key,
                        attempt = attempt + 1,
                        "Rollback precondition failed, retrying"
                    );
                    metrics::record_retry("rollback");
                    last_error = Some(e);
                    let delay = Duration::from_millis(RETRY_BASE_DELAY_MS * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(user_key = %key, error = %e, "Failed to roll back reservation");
                    return Err(e.into());
                }
            }
        }

        warn!(
            user_key = %key,
            retries = MAX_LEDGER_RETRIES,
            error = ?last_error,
            "Rollback failed after retries"
        );
        Err(LedgerError::Contention)
    }

    /// Read-only usage snapshot for display. Never mutates; a record whose
    /// reset time has passed is presented with a zeroed count (the actual
    /// reset commits with the next reservation).
    pub async fn status(&self, key: &UserKey) -> LedgerResult<Option<UsageRecord>> {
        let versioned = match self.store.get(key).await? {
            Some(v) => v,
            None => return Ok(None),
        };

        let mut record = versioned.record;
        if Utc::now() >= record.next_reset_at {
            record.consumed_count = 0;
            record.last_use_date = None;
        }
        Ok(Some(record))
    }

    /// Record an audit event asynchronously (fire-and-forget). Failures are
    /// logged but never affect the caller.
    fn record_event(&self, key: &UserKey, action: UsageAction, consumed_after: u32) {
        let store = Arc::clone(&self.store);
        let event = UsageEvent::new(key.clone(), action, consumed_after);
        let key = key.clone();

        tokio::spawn(async move {
            match tokio::time::timeout(AUDIT_RECORD_TIMEOUT, store.append_event(event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(user_key = %key, error = %e, "Failed to record usage event");
                }
                Err(_) => {
                    warn!(
                        user_key = %key,
                        timeout_secs = AUDIT_RECORD_TIMEOUT.as_secs(),
                        "Usage event recording timed out"
                    );
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLedgerStore;
    use chrono::Duration as ChronoDuration;
    use lumen_models::PlanTier;

    fn ledger() -> (QuotaLedger, Arc<MemoryLedgerStore>) {
        let store = Arc::new(MemoryLedgerStore::new());
        (QuotaLedger::new(store.clone()), store)
    }

    fn cycle(plan: PlanTier, limit: u32, token: &str) -> CycleInfo {
        let now = Utc::now();
        CycleInfo {
            plan,
            usage_limit: limit,
            cycle_anchor: now,
            next_reset_at: now + ChronoDuration::days(30),
            cycle_token: Some(token.into()),
        }
    }

    #[tokio::test]
    async fn test_first_reservation_creates_record() {
        let (ledger, store) = ledger();
        let key = UserKey::purchase("t1");
        let info = cycle(PlanTier::Monthly, 150, "txn-1");

        let record = ledger.check_and_reserve(&key, &info).await.unwrap();
        assert_eq!(record.consumed_count, 1);
        assert_eq!(store.snapshot(&key).unwrap().consumed_count, 1);
    }

    #[tokio::test]
    async fn test_reservation_denied_at_limit_leaves_status_unchanged() {
        // Scenario A: limit 5, consumed 5.
        let (ledger, store) = ledger();
        let key = UserKey::purchase("t1");
        let info = cycle(PlanTier::Monthly, 5, "txn-1");

        for _ in 0..5 {
            ledger.check_and_reserve(&key, &info).await.unwrap();
        }

        let err = ledger.check_and_reserve(&key, &info).await.unwrap_err();
        match err {
            LedgerError::CycleLimitReached { used, limit } => {
                assert_eq!(used, 5);
                assert_eq!(limit, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.snapshot(&key).unwrap().consumed_count, 5);
    }

    #[tokio::test]
    async fn test_daily_limit_denies_with_daily_reason_despite_headroom() {
        // Scenario C: free plan, second reservation same day.
        let (ledger, _) = ledger();
        let key = UserKey::anonymous("device-1");
        let info = cycle(PlanTier::Free, 3, "txn-1");

        ledger.check_and_reserve(&key, &info).await.unwrap();
        let err = ledger.check_and_reserve(&key, &info).await.unwrap_err();
        assert!(matches!(err, LedgerError::DailyLimitReached));
        assert_eq!(err.limit_scope(), Some(lumen_models::LimitScope::Daily));
    }

    #[tokio::test]
    async fn test_new_cycle_token_resets_count_atomically() {
        // P3: new token observed by a reservation yields consumed == 1 and
        // the new cycle fields, never a mix.
        let (ledger, store) = ledger();
        let key = UserKey::purchase("t1");
        let first = cycle(PlanTier::Monthly, 150, "txn-1");

        for _ in 0..4 {
            ledger.check_and_reserve(&key, &first).await.unwrap();
        }

        let renewed = cycle(PlanTier::Monthly, 150, "txn-2");
        let record = ledger.check_and_reserve(&key, &renewed).await.unwrap();
        assert_eq!(record.consumed_count, 1);
        assert_eq!(record.cycle_token.as_deref(), Some("txn-2"));
        assert_eq!(record.last_use_date, Some(Utc::now().date_naive()));
        assert_eq!(store.snapshot(&key).unwrap().next_reset_at, renewed.next_reset_at);
    }

    #[tokio::test]
    async fn test_rollback_restores_count() {
        // Scenario B: consumed 3, one failed job, back to 3.
        let (ledger, store) = ledger();
        let key = UserKey::purchase("t1");
        let info = cycle(PlanTier::Monthly, 5, "txn-1");

        for _ in 0..3 {
            ledger.check_and_reserve(&key, &info).await.unwrap();
        }
        ledger.check_and_reserve(&key, &info).await.unwrap();
        assert_eq!(store.snapshot(&key).unwrap().consumed_count, 4);

        assert!(ledger.rollback(&key).await.unwrap());
        assert_eq!(store.snapshot(&key).unwrap().consumed_count, 3);
    }

    #[tokio::test]
    async fn test_rollback_is_idempotent_at_zero() {
        // P2: double rollback never double-credits.
        let (ledger, store) = ledger();
        let key = UserKey::purchase("t1");
        let info = cycle(PlanTier::Monthly, 5, "txn-1");

        ledger.check_and_reserve(&key, &info).await.unwrap();
        assert!(ledger.rollback(&key).await.unwrap());
        assert!(!ledger.rollback(&key).await.unwrap());
        assert_eq!(store.snapshot(&key).unwrap().consumed_count, 0);
    }

    #[tokio::test]
    async fn test_rollback_on_missing_record_is_noop() {
        let (ledger, _) = ledger();
        let key = UserKey::purchase("never-seen");
        assert!(!ledger.rollback(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_overspend() {
        // P1/Scenario E: N concurrent callers, limit L, at most L commit.
        let (ledger, store) = ledger();
        let key = UserKey::purchase("shared-account");
        let info = cycle(PlanTier::Monthly, 1, "txn-1");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            let key = key.clone();
            let info = info.clone();
            handles.push(tokio::spawn(async move {
                ledger.check_and_reserve(&key, &info).await.is_ok()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 1);
        assert_eq!(store.snapshot(&key).unwrap().consumed_count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_at_larger_limit() {
        let (ledger, store) = ledger();
        let key = UserKey::purchase("shared-account");
        let info = cycle(PlanTier::Monthly, 5, "txn-1");

        let mut handles = Vec::new();
        for _ in 0..20 {
            let ledger = ledger.clone();
            let key = key.clone();
            let info = info.clone();
            handles.push(tokio::spawn(async move {
                ledger.check_and_reserve(&key, &info).await.is_ok()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert!(granted <= 5, "granted {granted} of limit 5");
        assert_eq!(store.snapshot(&key).unwrap().consumed_count, granted);
    }

    #[tokio::test]
    async fn test_status_presents_virtual_reset_after_rollover() {
        let (ledger, store) = ledger();
        let key = UserKey::purchase("t1");
        let info = cycle(PlanTier::Monthly, 5, "txn-1");

        ledger.check_and_reserve(&key, &info).await.unwrap();

        // Force the stored record past its reset time.
        let versioned = store.get(&key).await.unwrap().unwrap();
        let mut expired = versioned.record.clone();
        expired.next_reset_at = Utc::now() - ChronoDuration::seconds(1);
        store.update(expired, &versioned.version).await.unwrap();

        let status = ledger.status(&key).await.unwrap().unwrap();
        assert_eq!(status.consumed_count, 0);

        // The stored record itself is untouched (status never mutates).
        assert_eq!(store.snapshot(&key).unwrap().consumed_count, 1);
    }

    #[tokio::test]
    async fn test_reserve_records_audit_event() {
        let (ledger, store) = ledger();
        let key = UserKey::purchase("t1");
        let info = cycle(PlanTier::Monthly, 5, "txn-1");

        ledger.check_and_reserve(&key, &info).await.unwrap();

        // Audit recording is spawned; give it a beat.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let events = store.list_events(&key).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, UsageAction::Reserve);
        assert_eq!(events[0].consumed_after, 1);
    }
}
