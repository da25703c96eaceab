//! Recovery metrics collection.

use metrics::counter;

/// Metric name constants for consistency.
pub mod names {
    /// Journal entries settled at startup, by disposition.
    pub const RECOVERED_JOBS_TOTAL: &str = "recovery_jobs_total";
}

/// Record one settled journal entry.
pub fn record_disposition(disposition: &str) {
    counter!(
        names::RECOVERED_JOBS_TOTAL,
        "disposition" => disposition.to_string()
    )
    .increment(1);
}
