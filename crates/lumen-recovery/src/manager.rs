//! Journal replay at startup.
//!
//! Settles every persisted entry exactly once per run:
//! - ghost entries (no provider id was ever assigned) roll their
//!   reservation back and are cleared;
//! - entries whose provider is reachable are handed back to the lifecycle
//!   manager, which finishes them through the normal resolution paths
//!   (including an immediate wall-clock timeout for overdue jobs);
//! - entries whose outcome cannot be determined stay journaled and are
//!   surfaced as unresolved once stale, then escalated to failed with a
//!   rollback once abandoned.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use lumen_ledger::{LedgerError, QuotaLedger};
use lumen_lifecycle::{JobJournal, JobLifecycleManager, JournalEntry, JournalError};
use lumen_provider::GenerationProvider;

use crate::config::RecoveryConfig;
use crate::metrics;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

pub type RecoveryResult<T> = Result<T, RecoveryError>;

/// What one recovery run did with the journal.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Entries handed back to the lifecycle manager.
    pub resumed: usize,
    /// Ghost entries rolled back and cleared.
    pub ghosts_cleared: usize,
    /// Stale entries with an undeterminable outcome, kept for a later run.
    pub unresolved: usize,
    /// Abandoned entries escalated to failed and cleared.
    pub abandoned: usize,
}

impl RecoveryReport {
    /// Total entries settled or touched by this run.
    pub fn total(&self) -> usize {
        self.resumed + self.ghosts_cleared + self.unresolved + self.abandoned
    }
}

/// Startup recovery over the persisted job journal.
pub struct RecoveryManager {
    journal: Arc<JobJournal>,
    ledger: QuotaLedger,
    provider: Arc<dyn GenerationProvider>,
    lifecycle: JobLifecycleManager,
    config: RecoveryConfig,
}

impl RecoveryManager {
    /// Create a recovery manager.
    pub fn new(
        journal: Arc<JobJournal>,
        ledger: QuotaLedger,
        provider: Arc<dyn GenerationProvider>,
        lifecycle: JobLifecycleManager,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            journal,
            ledger,
            provider,
            lifecycle,
            config,
        }
    }

    /// Replay the journal once. Call at startup, before accepting new
    /// submissions, so resumed jobs re-register ahead of fresh traffic.
    pub async fn run(&self) -> RecoveryResult<RecoveryReport> {
        let entries = self.journal.list()?;
        if entries.is_empty() {
            return Ok(RecoveryReport::default());
        }

        info!(count = entries.len(), "Replaying job journal");
        let mut report = RecoveryReport::default();

        for entry in entries {
            match self.settle(&entry).await {
                Ok(disposition) => {
                    metrics::record_disposition(disposition.as_str());
                    match disposition {
                        Disposition::Resumed => report.resumed += 1,
                        Disposition::GhostCleared => report.ghosts_cleared += 1,
                        Disposition::Unresolved => report.unresolved += 1,
                        Disposition::Abandoned => report.abandoned += 1,
                    }
                }
                Err(e) => {
                    // Left journaled; the next startup tries again.
                    warn!(local_id = %entry.local_id, error = %e, "Failed to settle journal entry");
                }
            }
        }

        info!(
            resumed = report.resumed,
            ghosts = report.ghosts_cleared,
            unresolved = report.unresolved,
            abandoned = report.abandoned,
            "Journal replay complete"
        );
        Ok(report)
    }

    async fn settle(&self, entry: &JournalEntry) -> RecoveryResult<Disposition> {
        if entry.is_ghost() {
            // Quota was reserved but the provider never assigned an id, so
            // nothing is running. Refund and clear.
            self.rollback(entry).await?;
            self.journal.remove(&entry.local_id)?;
            self.lifecycle
                .events()
                .failed(&entry.local_id, "Interrupted before the provider accepted the submission");
            info!(local_id = %entry.local_id, "Cleared ghost journal entry");
            return Ok(Disposition::GhostCleared);
        }

        match self.provider.poll(&entry.provider_job_id).await {
            Ok(_) => {
                // Reachable, whatever the state: the lifecycle manager
                // finishes it through its normal paths. Overdue jobs hit
                // their original wall-clock deadline immediately.
                self.lifecycle.resume(entry);
                Ok(Disposition::Resumed)
            }
            Err(e) => {
                let age = entry.age(Utc::now());
                if age >= self.config.abandonment_threshold {
                    // The outcome will never be known. Favor the user.
                    self.rollback(entry).await?;
                    self.journal.remove(&entry.local_id)?;
                    self.lifecycle
                        .events()
                        .failed(&entry.local_id, "Generation was abandoned after a restart");
                    warn!(
                        local_id = %entry.local_id,
                        job_id = %entry.provider_job_id,
                        error = %e,
                        "Escalated abandoned journal entry to failed"
                    );
                    Ok(Disposition::Abandoned)
                } else if age >= self.config.staleness_threshold {
                    // Distinguishable from both success and failure; the
                    // reservation stands and the entry stays for later runs.
                    self.lifecycle.events().unresolved(&entry.local_id);
                    warn!(
                        local_id = %entry.local_id,
                        job_id = %entry.provider_job_id,
                        age_minutes = age.num_minutes(),
                        "Journal entry outcome is unresolved"
                    );
                    Ok(Disposition::Unresolved)
                } else {
                    // Fresh enough that the error is likely transient; the
                    // resumed poll loop retries within the time budget.
                    self.lifecycle.resume(entry);
                    Ok(Disposition::Resumed)
                }
            }
        }
    }

    async fn rollback(&self, entry: &JournalEntry) -> RecoveryResult<()> {
        let applied = self.ledger.rollback(&entry.owner_key).await?;
        info!(
            local_id = %entry.local_id,
            user_key = %entry.owner_key,
            applied,
            "Rolled back reservation during recovery"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Disposition {
    Resumed,
    GhostCleared,
    Unresolved,
    Abandoned,
}

impl Disposition {
    fn as_str(&self) -> &'static str {
        match self {
            Disposition::Resumed => "resumed",
            Disposition::GhostCleared => "ghost_cleared",
            Disposition::Unresolved => "unresolved",
            Disposition::Abandoned => "abandoned",
        }
    }
}
