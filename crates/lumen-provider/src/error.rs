//! Provider client error types.

use thiserror::Error;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider rejected the submission outright.
    #[error("Submission failed: {0}")]
    Submission(String),

    /// The provider does not know the given job id.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// The provider refused the content (safety/policy). Never retried
    /// automatically and never reinterpreted as success.
    #[error("Content rejected: {0}")]
    ContentRejected(String),

    /// Transport-level failure.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The provider answered with something we cannot interpret.
    #[error("Unexpected provider response: {0}")]
    Unexpected(String),
}

impl ProviderError {
    pub fn submission(msg: impl Into<String>) -> Self {
        Self::Submission(msg.into())
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    /// Whether this failure is a connectivity problem rather than a
    /// provider-side verdict. Connectivity problems are retryable.
    pub fn is_network(&self) -> bool {
        match self {
            ProviderError::Network(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}
