//! Ledger error types.

use lumen_models::LimitScope;
use thiserror::Error;

use crate::store::StoreError;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The per-cycle limit would be exceeded; the increment did not commit.
    #[error("Cycle limit reached: {used} of {limit} used")]
    CycleLimitReached { used: u32, limit: u32 },

    /// The one-per-day sub-limit was hit, even though the cycle has headroom.
    #[error("Daily limit reached: one generation per day on this plan")]
    DailyLimitReached,

    /// Concurrent updates exhausted the optimistic-lock retries.
    #[error("Reservation failed due to concurrent updates")]
    Contention,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Which limit denied the reservation, if this is a quota denial.
    pub fn limit_scope(&self) -> Option<LimitScope> {
        match self {
            LedgerError::CycleLimitReached { .. } => Some(LimitScope::Cycle),
            LedgerError::DailyLimitReached => Some(LimitScope::Daily),
            _ => None,
        }
    }

    /// Whether this error is a quota denial (as opposed to an operational
    /// failure of the store).
    pub fn is_denied(&self) -> bool {
        self.limit_scope().is_some()
    }
}
