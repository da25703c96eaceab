//! Lifecycle configuration.

use std::time::Duration;

use lumen_models::GenerationKind;

/// Lifecycle manager configuration.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Overall wall-clock timeout for photo jobs, from submission.
    pub photo_timeout: Duration,
    /// Overall wall-clock timeout for video jobs, from submission.
    pub video_timeout: Duration,
    /// Estimated photo generation duration, for progress display.
    pub photo_estimated_duration: Duration,
    /// Estimated video generation duration, for progress display.
    pub video_estimated_duration: Duration,
    /// Initial poll interval.
    pub poll_initial_interval: Duration,
    /// Poll interval cap.
    pub poll_max_interval: Duration,
    /// Callback target handed to the provider, if deployed with one.
    pub callback_target: Option<String>,
    /// Event channel capacity.
    pub event_capacity: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            photo_timeout: Duration::from_secs(120),
            video_timeout: Duration::from_secs(600), // 10 minutes
            photo_estimated_duration: Duration::from_secs(30),
            video_estimated_duration: Duration::from_secs(240),
            poll_initial_interval: Duration::from_secs(5),
            poll_max_interval: Duration::from_secs(30),
            callback_target: None,
            event_capacity: 256,
        }
    }
}

impl LifecycleConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            photo_timeout: env_secs("LIFECYCLE_PHOTO_TIMEOUT_SECS", defaults.photo_timeout),
            video_timeout: env_secs("LIFECYCLE_VIDEO_TIMEOUT_SECS", defaults.video_timeout),
            photo_estimated_duration: env_secs(
                "LIFECYCLE_PHOTO_ESTIMATE_SECS",
                defaults.photo_estimated_duration,
            ),
            video_estimated_duration: env_secs(
                "LIFECYCLE_VIDEO_ESTIMATE_SECS",
                defaults.video_estimated_duration,
            ),
            poll_initial_interval: env_secs(
                "LIFECYCLE_POLL_INITIAL_SECS",
                defaults.poll_initial_interval,
            ),
            poll_max_interval: env_secs("LIFECYCLE_POLL_MAX_SECS", defaults.poll_max_interval),
            callback_target: std::env::var("LIFECYCLE_CALLBACK_TARGET").ok(),
            event_capacity: std::env::var("LIFECYCLE_EVENT_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.event_capacity),
        }
    }

    /// Overall wall-clock timeout for a job of the given kind.
    pub fn timeout_for(&self, kind: GenerationKind) -> Duration {
        match kind {
            GenerationKind::Photo => self.photo_timeout,
            GenerationKind::Video => self.video_timeout,
        }
    }

    /// Estimated duration for progress display.
    pub fn estimate_for(&self, kind: GenerationKind) -> Duration {
        match kind {
            GenerationKind::Photo => self.photo_estimated_duration,
            GenerationKind::Video => self.video_estimated_duration,
        }
    }
}

fn env_secs(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_budget_exceeds_photo_budget() {
        let config = LifecycleConfig::default();
        assert!(config.timeout_for(GenerationKind::Video) > config.timeout_for(GenerationKind::Photo));
        assert!(config.estimate_for(GenerationKind::Video) > config.estimate_for(GenerationKind::Photo));
    }
}
