//! Job event messages delivered to the presentation layer.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Per-job event published to subscribers.
///
/// At most one terminal event is emitted per job; `Progress` may repeat
/// with a monotonically non-decreasing percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// Progress update (0-99 until terminal).
    Progress { percent: u8 },

    /// Terminal success with the persisted output reference.
    Succeeded { output_ref: String },

    /// Terminal failure. Quota denials never reach the event stream: they
    /// are reported synchronously from submission, before a job exists.
    Failed { reason: String },

    /// Terminal user-initiated cancellation.
    Canceled,

    /// Recovery could not determine the true outcome. Distinguishable from
    /// both success and failure; quota is not rolled back.
    Unresolved,
}

impl JobEvent {
    /// Progress update, capped at 100.
    pub fn progress(percent: u8) -> Self {
        Self::Progress {
            percent: percent.min(100),
        }
    }

    /// Terminal success event.
    pub fn succeeded(output_ref: impl Into<String>) -> Self {
        Self::Succeeded {
            output_ref: output_ref.into(),
        }
    }

    /// Terminal failure event.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Whether this event terminates the job's event stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_not_terminal() {
        assert!(!JobEvent::progress(50).is_terminal());
        assert!(JobEvent::succeeded("media://out").is_terminal());
        assert!(JobEvent::failed("boom").is_terminal());
        assert!(JobEvent::Canceled.is_terminal());
        assert!(JobEvent::Unresolved.is_terminal());
    }

    #[test]
    fn test_progress_caps_at_100() {
        assert_eq!(JobEvent::progress(250), JobEvent::Progress { percent: 100 });
    }
}
