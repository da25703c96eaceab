//! Job lifecycle manager.
//!
//! One driver task per job consumes a single signal channel fed by two
//! producers: the poll loop and pushed provider callbacks. Whichever
//! terminal signal arrives first drives the transition; the job machine is
//! the sole authority on "already terminal", so the loser is a no-op. Any
//! path into Failed/Canceled rolls the quota reservation back exactly once;
//! no path into Succeeded ever does.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use lumen_identity::IdentityResolver;
use lumen_ledger::QuotaLedger;
use lumen_models::{
    GenerationJob, GenerationKind, JobId, JobPhase, LocalJobId, PlanTier, UsageRecord, UserKey,
};
use lumen_provider::{GenerationProvider, ProviderCallback, ProviderError, ProviderJobState, ProviderStatus};

use crate::config::LifecycleConfig;
use crate::error::{LifecycleError, LifecycleResult};
use crate::events::EventChannel;
use crate::journal::{JobJournal, JournalEntry};
use crate::output::OutputStore;
use crate::progress::estimate_progress;
use crate::poll_health::PollHealth;

/// Signal channel depth per job.
const SIGNAL_CHANNEL_CAPACITY: usize = 8;

/// Synchronous result of the Reserving step.
#[derive(Debug, Clone)]
pub struct SubmitReceipt {
    /// Local id for cancellation, events, and recovery.
    pub local_id: LocalJobId,
    /// Provider-assigned job id.
    pub job_id: JobId,
}

/// Read-only quota snapshot for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaStatus {
    pub used: u32,
    pub limit: u32,
    pub plan: PlanTier,
    pub next_reset_at: DateTime<Utc>,
}

impl From<UsageRecord> for QuotaStatus {
    fn from(record: UsageRecord) -> Self {
        Self {
            used: record.consumed_count,
            limit: record.usage_limit,
            plan: record.plan,
            next_reset_at: record.next_reset_at,
        }
    }
}

/// Completion/cancellation signals feeding one job's driver.
#[derive(Debug)]
enum JobSignal {
    /// Provider status, from the poll loop or a pushed callback.
    Provider(ProviderStatus),
    /// User-initiated cancellation.
    Cancel,
    /// The wall-clock time budget ran out.
    TimedOut,
}

struct JobHandle {
    job: Arc<Mutex<GenerationJob>>,
    signals: mpsc::Sender<JobSignal>,
}

struct ManagerInner {
    ledger: QuotaLedger,
    identity: IdentityResolver,
    provider: Arc<dyn GenerationProvider>,
    output_store: Arc<dyn OutputStore>,
    journal: Arc<JobJournal>,
    events: EventChannel,
    config: LifecycleConfig,
    jobs: Mutex<HashMap<LocalJobId, JobHandle>>,
}

/// Manager for generation job lifecycles.
#[derive(Clone)]
pub struct JobLifecycleManager {
    inner: Arc<ManagerInner>,
}

impl JobLifecycleManager {
    /// Create a new lifecycle manager.
    pub fn new(
        ledger: QuotaLedger,
        identity: IdentityResolver,
        provider: Arc<dyn GenerationProvider>,
        output_store: Arc<dyn OutputStore>,
        journal: Arc<JobJournal>,
        config: LifecycleConfig,
    ) -> Self {
        let events = EventChannel::new(config.event_capacity);
        Self {
            inner: Arc::new(ManagerInner {
                ledger,
                identity,
                provider,
                output_store,
                journal,
                events,
                config,
                jobs: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The event channel the presentation layer subscribes to.
    pub fn events(&self) -> &EventChannel {
        &self.inner.events
    }

    /// Submit a generation request.
    ///
    /// Synchronous through the Reserving step: identity resolution, plan
    /// lookup, and the atomic quota reservation all complete (or deny)
    /// before this returns. The provider call happens next; the recovery
    /// record is persisted before the receipt is handed back, and the
    /// polling driver is spawned in the background.
    pub async fn submit_job(
        &self,
        kind: GenerationKind,
        input_ref: impl Into<String>,
    ) -> LifecycleResult<SubmitReceipt> {
        let identity = self
            .inner
            .identity
            .resolve()
            .await
            .map_err(|e| LifecycleError::IdentityUnresolvable(e.to_string()))?;

        // Fail closed: no plan details, no reservation, no provider call.
        let cycle = self
            .inner
            .identity
            .plan_details(&identity.key)
            .await
            .map_err(|e| LifecycleError::IdentityUnresolvable(e.to_string()))?;

        let mut job = GenerationJob::new(kind, identity.key.clone(), input_ref);

        self.inner
            .ledger
            .check_and_reserve(&identity.key, &cycle)
            .await
            .map_err(LifecycleError::from_ledger)?;

        let provider_id = match self
            .inner
            .provider
            .submit(kind, &job.input_ref, self.inner.config.callback_target.as_deref())
            .await
        {
            Ok(id) => id,
            Err(e) => {
                // The reservation was consumed but no provider-side
                // resource exists; reverse it before surfacing the error.
                self.rollback_unshared(&mut job).await;
                return Err(LifecycleError::from_submission(e));
            }
        };

        job.mark_submitted(provider_id.clone());

        // Persisted synchronously before the caller sees the receipt, so a
        // kill right after submission loses no accounting information. If
        // the record cannot be written the submission is not acknowledged:
        // the unit is refunded and the provider job is left to finish
        // unobserved (its late callback finds no tracked job and is
        // ignored).
        if let Err(e) = self.inner.journal.record(&JournalEntry::from_job(&job)) {
            error!(local_id = %job.local_id, error = %e, "Failed to persist recovery record");
            self.rollback_unshared(&mut job).await;
            return Err(LifecycleError::PersistenceFailed(format!(
                "recovery record could not be written: {e}"
            )));
        }

        info!(
            local_id = %job.local_id,
            job_id = %provider_id,
            kind = %kind,
            user_key = %job.owner_key,
            "Submitted generation job"
        );

        let receipt = SubmitReceipt {
            local_id: job.local_id.clone(),
            job_id: provider_id,
        };
        self.spawn_driver(job);
        Ok(receipt)
    }

    /// Request cooperative cancellation of an in-flight job.
    ///
    /// Marks the job canceled and rolls back its reservation; the
    /// provider-side computation is not guaranteed to stop, and a late
    /// success callback for the canceled job is ignored.
    pub async fn cancel_job(&self, local_id: &LocalJobId) -> LifecycleResult<()> {
        let sender = {
            let jobs = self.inner.jobs.lock().expect("jobs lock poisoned");
            let handle = jobs
                .get(local_id)
                .ok_or_else(|| LifecycleError::UnknownJob(local_id.to_string()))?;
            if handle.job.lock().expect("job lock poisoned").is_terminal() {
                return Ok(());
            }
            handle.signals.clone()
        };

        let _ = sender.send(JobSignal::Cancel).await;
        Ok(())
    }

    /// Ingest a pushed provider callback.
    ///
    /// Callbacks for unknown or already-resolved jobs are ignored; in
    /// particular a late success for a canceled job never re-grants quota.
    pub async fn ingest_callback(&self, callback: ProviderCallback) -> LifecycleResult<()> {
        let (job_id, status) = callback.into_status();

        let sender = {
            let jobs = self.inner.jobs.lock().expect("jobs lock poisoned");
            jobs.values()
                .find(|h| h.job.lock().expect("job lock poisoned").job_id == job_id)
                .map(|h| h.signals.clone())
        };

        match sender {
            Some(sender) => {
                let _ = sender.send(JobSignal::Provider(status)).await;
            }
            None => {
                debug!(job_id = %job_id, "Callback for unknown or resolved job ignored");
            }
        }
        Ok(())
    }

    /// Retry the durable-persistence step of a semi-failed success.
    pub async fn retry_persist(&self, local_id: &LocalJobId) -> LifecycleResult<String> {
        let (job_arc, snapshot, output_ref) = {
            let jobs = self.inner.jobs.lock().expect("jobs lock poisoned");
            let handle = jobs
                .get(local_id)
                .ok_or_else(|| LifecycleError::UnknownJob(local_id.to_string()))?;
            let job = handle.job.lock().expect("job lock poisoned");
            if job.phase != JobPhase::PersistencePending {
                return Err(LifecycleError::PersistenceFailed(
                    "job is not awaiting output persistence".into(),
                ));
            }
            let output_ref = job
                .output_ref
                .clone()
                .ok_or_else(|| LifecycleError::PersistenceFailed("no pending output".into()))?;
            (handle.job.clone(), job.clone(), output_ref)
        };

        match self.inner.output_store.persist(&snapshot, &output_ref).await {
            Ok(durable) => {
                job_arc.lock().expect("job lock poisoned").succeed(&durable);
                if let Err(e) = self.inner.journal.remove(local_id) {
                    warn!(local_id = %local_id, error = %e, "Failed to remove journal entry");
                }
                self.inner.events.succeeded(local_id, durable.clone());
                self.inner
                    .jobs
                    .lock()
                    .expect("jobs lock poisoned")
                    .remove(local_id);
                info!(local_id = %local_id, "Persistence retry completed job");
                Ok(durable)
            }
            Err(e) => Err(LifecycleError::PersistenceFailed(e.to_string())),
        }
    }

    /// Read-only quota snapshot for display. Never mutates.
    pub async fn quota_status(&self, key: &UserKey) -> LifecycleResult<Option<QuotaStatus>> {
        let record = self
            .inner
            .ledger
            .status(key)
            .await
            .map_err(LifecycleError::from_ledger)?;
        Ok(record.map(QuotaStatus::from))
    }

    /// Current phase of a tracked job, if any.
    pub fn job_phase(&self, local_id: &LocalJobId) -> Option<JobPhase> {
        let jobs = self.inner.jobs.lock().expect("jobs lock poisoned");
        jobs.get(local_id)
            .map(|h| h.job.lock().expect("job lock poisoned").phase)
    }

    /// Resume tracking a journaled job after a restart (recovery only).
    ///
    /// The original submission time carries over, so the wall-clock budget
    /// includes the time spent suspended.
    pub fn resume(&self, entry: &JournalEntry) -> LocalJobId {
        // The input reference is not part of the resumable state; only the
        // provider id and the accounting fields are needed from here on.
        let mut job = GenerationJob::new(entry.kind, entry.owner_key.clone(), "");
        job.local_id = entry.local_id.clone();
        job.job_id = entry.provider_job_id.clone();
        job.phase = JobPhase::Submitted;
        job.submitted_at = entry.submitted_at;

        info!(
            local_id = %job.local_id,
            job_id = %job.job_id,
            "Resuming journaled job"
        );

        let local_id = job.local_id.clone();
        self.spawn_driver(job);
        local_id
    }

    /// Single rollback attempt for a job not yet shared with a driver.
    async fn rollback_unshared(&self, job: &mut GenerationJob) {
        if !job.claim_rollback() {
            return;
        }
        if let Err(e) = self.inner.ledger.rollback(&job.owner_key).await {
            // The user-facing failure is reported regardless.
            warn!(user_key = %job.owner_key, error = %e, "Rollback failed");
        }
    }

    fn spawn_driver(&self, mut job: GenerationJob) {
        let local_id = job.local_id.clone();
        let provider_id = job.job_id.clone();
        let kind = job.kind;
        let submitted_at = job.submitted_at;

        job.mark_polling();
        let job = Arc::new(Mutex::new(job));
        let (tx, rx) = mpsc::channel(SIGNAL_CHANNEL_CAPACITY);

        {
            let mut jobs = self.inner.jobs.lock().expect("jobs lock poisoned");
            jobs.insert(
                local_id.clone(),
                JobHandle {
                    job: Arc::clone(&job),
                    signals: tx.clone(),
                },
            );
        }

        tokio::spawn(poll_loop(
            Arc::clone(&self.inner),
            local_id.clone(),
            provider_id,
            kind,
            submitted_at,
            tx,
        ));
        tokio::spawn(drive(Arc::clone(&self.inner), local_id, job, rx));
    }
}

/// Poll producer: emits progress and feeds terminal provider statuses into
/// the signal channel on an increasing-backoff schedule until the
/// wall-clock budget runs out.
async fn poll_loop(
    inner: Arc<ManagerInner>,
    local_id: LocalJobId,
    provider_id: JobId,
    kind: GenerationKind,
    submitted_at: DateTime<Utc>,
    signals: mpsc::Sender<JobSignal>,
) {
    let budget = chrono::Duration::from_std(inner.config.timeout_for(kind))
        .unwrap_or_else(|_| chrono::Duration::seconds(600));
    let deadline = submitted_at + budget;
    let estimate = inner.config.estimate_for(kind);
    let mut delay = inner.config.poll_initial_interval;
    let mut health = PollHealth::new();

    loop {
        if Utc::now() >= deadline {
            let _ = signals.send(JobSignal::TimedOut).await;
            return;
        }

        tokio::time::sleep(delay).await;

        // The callback path may have resolved the job already.
        if signals.is_closed() {
            return;
        }

        inner
            .events
            .progress(&local_id, estimate_progress(submitted_at, estimate, Utc::now()));

        match inner.provider.poll(&provider_id).await {
            Ok(status) if status.state.is_terminal() => {
                let _ = signals.send(JobSignal::Provider(status)).await;
                return;
            }
            Ok(_) => {
                if let Some(run) = health.note_success() {
                    debug!(job_id = %provider_id, failed_polls = run, "Polling recovered");
                }
            }
            Err(ProviderError::NotFound(_)) => {
                let _ = signals
                    .send(JobSignal::Provider(ProviderStatus::failed(
                        "Provider no longer knows this job",
                    )))
                    .await;
                return;
            }
            Err(e) => {
                // Transient/network errors keep polling until the window
                // closes; the job only fails when the budget runs out.
                if health.note_failure() {
                    warn!(
                        job_id = %provider_id,
                        failed_polls = health.streak(),
                        error = %e,
                        "Poll failed"
                    );
                }
            }
        }

        delay = (delay * 3 / 2).min(inner.config.poll_max_interval);
    }
}

/// Single consumer of one job's signal channel.
async fn drive(
    inner: Arc<ManagerInner>,
    local_id: LocalJobId,
    job: Arc<Mutex<GenerationJob>>,
    mut signals: mpsc::Receiver<JobSignal>,
) {
    while let Some(signal) = signals.recv().await {
        let resolved = match signal {
            JobSignal::Provider(status) => {
                resolve_provider(&inner, &local_id, &job, status).await
            }
            JobSignal::Cancel => resolve_cancel(&inner, &local_id, &job).await,
            JobSignal::TimedOut => {
                resolve_failure(&inner, &local_id, &job, "Generation timed out. Please try again.")
                    .await
            }
        };
        if resolved {
            break;
        }
    }

    // Keep the handle while a manual persistence retry is outstanding.
    let awaiting_persist = {
        job.lock().expect("job lock poisoned").phase == JobPhase::PersistencePending
    };
    if !awaiting_persist {
        inner
            .jobs
            .lock()
            .expect("jobs lock poisoned")
            .remove(&local_id);
    }
}

/// Apply a provider status. Returns `true` once the driver should stop.
async fn resolve_provider(
    inner: &Arc<ManagerInner>,
    local_id: &LocalJobId,
    job: &Arc<Mutex<GenerationJob>>,
    status: ProviderStatus,
) -> bool {
    // The loser of the poll/callback race is a no-op.
    if job.lock().expect("job lock poisoned").is_terminal() {
        return true;
    }

    match status.state {
        ProviderJobState::Succeeded => {
            let output_ref = match status.output_ref {
                Some(output_ref) => output_ref,
                None => {
                    return resolve_failure(
                        inner,
                        local_id,
                        job,
                        "Provider reported success without an output",
                    )
                    .await;
                }
            };

            let snapshot = job.lock().expect("job lock poisoned").clone();
            match inner.output_store.persist(&snapshot, &output_ref).await {
                Ok(durable) => {
                    job.lock().expect("job lock poisoned").succeed(&durable);
                    if let Err(e) = inner.journal.remove(local_id) {
                        warn!(local_id = %local_id, error = %e, "Failed to remove journal entry");
                    }
                    inner.events.succeeded(local_id, durable);
                    info!(local_id = %local_id, "Generation succeeded");
                    true
                }
                Err(e) => {
                    // Semi-failure: the output exists but is not durable
                    // yet. The success is pending, not lost, so quota is
                    // not rolled back and no terminal event is emitted.
                    job.lock()
                        .expect("job lock poisoned")
                        .mark_persistence_pending(&output_ref, e.to_string());
                    error!(
                        local_id = %local_id,
                        error = %e,
                        "Output persistence failed; awaiting manual retry"
                    );
                    true
                }
            }
        }
        ProviderJobState::Failed => {
            let reason = status
                .error
                .unwrap_or_else(|| "Generation failed".to_string());
            resolve_failure(inner, local_id, job, &reason).await
        }
        ProviderJobState::Rejected => {
            // Distinct, non-retryable message; the reserved unit still
            // rolls back.
            let detail = status
                .error
                .unwrap_or_else(|| "content policy violation".to_string());
            resolve_failure(inner, local_id, job, &format!("Content rejected: {detail}")).await
        }
        ProviderJobState::Queued | ProviderJobState::Running => false,
    }
}

/// Roll back and mark the job failed. Returns `true` (driver stops).
async fn resolve_failure(
    inner: &Arc<ManagerInner>,
    local_id: &LocalJobId,
    job: &Arc<Mutex<GenerationJob>>,
    reason: &str,
) -> bool {
    if job.lock().expect("job lock poisoned").is_terminal() {
        return true;
    }

    rollback_once(inner, job).await;
    job.lock().expect("job lock poisoned").fail(reason);
    if let Err(e) = inner.journal.remove(local_id) {
        warn!(local_id = %local_id, error = %e, "Failed to remove journal entry");
    }
    inner.events.failed(local_id, reason);
    info!(local_id = %local_id, reason = %reason, "Generation failed");
    true
}

async fn resolve_cancel(
    inner: &Arc<ManagerInner>,
    local_id: &LocalJobId,
    job: &Arc<Mutex<GenerationJob>>,
) -> bool {
    if job.lock().expect("job lock poisoned").is_terminal() {
        return true;
    }

    rollback_once(inner, job).await;
    job.lock().expect("job lock poisoned").cancel();
    if let Err(e) = inner.journal.remove(local_id) {
        warn!(local_id = %local_id, error = %e, "Failed to remove journal entry");
    }
    inner.events.canceled(local_id);
    info!(local_id = %local_id, "Generation canceled");
    true
}

/// At most one rollback per job, guarded by the job's claim flag. A failed
/// rollback is logged and never blocks the failure report.
async fn rollback_once(inner: &Arc<ManagerInner>, job: &Arc<Mutex<GenerationJob>>) {
    let (claimed, key) = {
        let mut job = job.lock().expect("job lock poisoned");
        (job.claim_rollback(), job.owner_key.clone())
    };
    if !claimed {
        return;
    }
    if let Err(e) = inner.ledger.rollback(&key).await {
        warn!(user_key = %key, error = %e, "Rollback failed");
    }
}
