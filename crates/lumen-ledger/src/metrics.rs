//! Ledger metrics collection.
//!
//! Provides standardized metrics for monitoring ledger operations:
//! - Reservation counters by outcome
//! - Rollback counters
//! - Optimistic-lock retry counters

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    /// Total reservation attempts by outcome.
    pub const RESERVATIONS_TOTAL: &str = "ledger_reservations_total";

    /// Total rollbacks by effect (applied vs no-op).
    pub const ROLLBACKS_TOTAL: &str = "ledger_rollbacks_total";

    /// Total precondition-failure retries.
    pub const RETRIES_TOTAL: &str = "ledger_retries_total";
}

/// Record a completed reservation attempt.
pub fn record_reservation(outcome: &str) {
    counter!(
        names::RESERVATIONS_TOTAL,
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record a rollback, noting whether it actually decremented the counter.
pub fn record_rollback(applied: bool) {
    counter!(
        names::ROLLBACKS_TOTAL,
        "effect" => if applied { "applied" } else { "noop" }
    )
    .increment(1);
}

/// Record an optimistic-lock retry.
pub fn record_retry(operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}
