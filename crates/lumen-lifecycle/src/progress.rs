//! Time-based progress estimation.
//!
//! The provider reports no intermediate progress, so the percentage shown
//! to the user is derived from elapsed wall-clock time against an estimated
//! total duration for the job's kind. The estimate is monotone
//! non-decreasing and capped below 100 until a terminal state is reached,
//! so the UI never shows "100%" before the result is actually available.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Highest percentage reported before a terminal state.
pub const PROGRESS_CAP: u8 = 99;

/// Estimate progress for a job submitted at `submitted_at`.
///
/// Elapsed time includes any period the process spent suspended.
pub fn estimate_progress(
    submitted_at: DateTime<Utc>,
    estimated_total: Duration,
    now: DateTime<Utc>,
) -> u8 {
    let elapsed = (now - submitted_at).num_milliseconds().max(0) as f64;
    let total = estimated_total.as_millis().max(1) as f64;
    let percent = (elapsed / total * 100.0) as u8;
    percent.min(PROGRESS_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_progress_starts_at_zero() {
        let now = Utc::now();
        assert_eq!(estimate_progress(now, Duration::from_secs(30), now), 0);
    }

    #[test]
    fn test_progress_halfway() {
        let now = Utc::now();
        let submitted = now - ChronoDuration::seconds(15);
        assert_eq!(estimate_progress(submitted, Duration::from_secs(30), now), 50);
    }

    #[test]
    fn test_progress_never_reaches_100_before_terminal() {
        let now = Utc::now();
        let submitted = now - ChronoDuration::seconds(3600);
        assert_eq!(
            estimate_progress(submitted, Duration::from_secs(30), now),
            PROGRESS_CAP
        );
    }

    #[test]
    fn test_progress_is_monotone_over_time() {
        let submitted = Utc::now();
        let total = Duration::from_secs(240);
        let mut last = 0;
        for secs in [0i64, 30, 60, 120, 180, 240, 600] {
            let p = estimate_progress(submitted, total, submitted + ChronoDuration::seconds(secs));
            assert!(p >= last);
            last = p;
        }
    }
}
