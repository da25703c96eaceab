//! Lifecycle error taxonomy.

use lumen_ledger::LedgerError;
use lumen_models::LimitScope;
use lumen_provider::ProviderError;
use thiserror::Error;

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Quota denied before any provider call; nothing to roll back. The
    /// scope tells the presentation layer which message to show.
    #[error("Quota exceeded ({scope} limit)")]
    QuotaExceeded { scope: LimitScope },

    /// No identity could be resolved; decided before any provider call.
    #[error("Identity unresolvable: {0}")]
    IdentityUnresolvable(String),

    /// The provider refused or failed to accept the submission.
    #[error("Provider submission failed: {0}")]
    ProviderSubmissionFailed(String),

    /// The job exceeded its wall-clock time budget.
    #[error("Provider timed out")]
    ProviderTimeout,

    /// The provider refused the content (safety/policy). Never retried
    /// automatically and never reinterpreted as success.
    #[error("Content rejected: {0}")]
    ProviderContentRejected(String),

    /// The network is unreachable. Retryable; the caller's input is
    /// preserved so resubmission does not require re-selecting media.
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// A required durable write failed: the recovery record at submission
    /// time, or the output store after a provider success.
    #[error("Persistence failed: {0}")]
    PersistenceFailed(String),

    /// Recovery could not determine the true outcome (recovery-only).
    #[error("Outcome is ambiguous")]
    AmbiguousOutcome,

    /// No tracked job with the given local id.
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// Operational ledger failure (not a quota denial).
    #[error("Ledger error: {0}")]
    Ledger(LedgerError),
}

impl LifecycleError {
    /// Map a ledger error: quota denials become [`Self::QuotaExceeded`]
    /// with their scope, operational failures pass through.
    pub fn from_ledger(e: LedgerError) -> Self {
        match e.limit_scope() {
            Some(scope) => Self::QuotaExceeded { scope },
            None => Self::Ledger(e),
        }
    }

    /// Map a provider submission error onto the taxonomy.
    pub fn from_submission(e: ProviderError) -> Self {
        match e {
            ProviderError::ContentRejected(reason) => Self::ProviderContentRejected(reason),
            e if e.is_network() => Self::NetworkUnavailable(e.to_string()),
            e => Self::ProviderSubmissionFailed(e.to_string()),
        }
    }

    /// Whether the caller may retry with the same input.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LifecycleError::NetworkUnavailable(_)
                | LifecycleError::ProviderTimeout
                | LifecycleError::PersistenceFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_rejection_is_not_retryable() {
        let err = LifecycleError::ProviderContentRejected("policy".into());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_network_and_timeout_are_retryable() {
        assert!(LifecycleError::ProviderTimeout.is_retryable());
        assert!(LifecycleError::NetworkUnavailable("offline".into()).is_retryable());
    }

    #[test]
    fn test_ledger_denial_maps_to_quota_exceeded() {
        let err = LifecycleError::from_ledger(LedgerError::DailyLimitReached);
        match err {
            LifecycleError::QuotaExceeded { scope } => assert_eq!(scope, LimitScope::Daily),
            other => panic!("unexpected: {other}"),
        }
    }
}
