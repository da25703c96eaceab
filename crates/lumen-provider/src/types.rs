//! Provider wire types.

use lumen_models::JobId;
use serde::{Deserialize, Serialize};

/// Provider-side job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderJobState {
    /// Accepted, not started.
    Queued,
    /// Generation in progress.
    Running,
    /// Finished with an output.
    Succeeded,
    /// Finished without an output.
    Failed,
    /// Refused on content/safety grounds. Distinct from `Failed` so the
    /// client never auto-retries it.
    Rejected,
}

impl ProviderJobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderJobState::Queued => "queued",
            ProviderJobState::Running => "running",
            ProviderJobState::Succeeded => "succeeded",
            ProviderJobState::Failed => "failed",
            ProviderJobState::Rejected => "rejected",
        }
    }

    /// Check if the provider considers the job finished.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProviderJobState::Succeeded | ProviderJobState::Failed | ProviderJobState::Rejected
        )
    }
}

impl std::fmt::Display for ProviderJobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status snapshot for one provider job, shared by poll responses and
/// pushed callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    /// Current provider-side state.
    pub state: ProviderJobState,
    /// Result reference, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,
    /// Failure detail, present on failure/rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderStatus {
    pub fn succeeded(output_ref: impl Into<String>) -> Self {
        Self {
            state: ProviderJobState::Succeeded,
            output_ref: Some(output_ref.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            state: ProviderJobState::Failed,
            output_ref: None,
            error: Some(error.into()),
        }
    }

    pub fn running() -> Self {
        Self {
            state: ProviderJobState::Running,
            output_ref: None,
            error: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            state: ProviderJobState::Rejected,
            output_ref: None,
            error: Some(reason.into()),
        }
    }
}

/// Pushed completion callback payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCallback {
    /// Provider job id the callback refers to.
    pub provider_job_id: JobId,
    /// Provider-side state.
    pub status: ProviderJobState,
    /// Result reference, present on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,
    /// Failure detail, present on failure/rejection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderCallback {
    /// Convert into the common status shape the lifecycle manager resolves.
    pub fn into_status(self) -> (JobId, ProviderStatus) {
        (
            self.provider_job_id,
            ProviderStatus {
                state: self.status,
                output_ref: self.output_ref,
                error: self.error,
            },
        )
    }
}
