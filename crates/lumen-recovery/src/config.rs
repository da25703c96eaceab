//! Recovery configuration.

use chrono::Duration;

/// Recovery manager configuration.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Age past which an entry with an undeterminable outcome is surfaced
    /// as unresolved rather than resumed.
    pub staleness_threshold: Duration,
    /// Age past which an undeterminable entry is escalated to failed and
    /// its reservation rolled back.
    pub abandonment_threshold: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            staleness_threshold: Duration::minutes(30),
            abandonment_threshold: Duration::hours(24),
        }
    }
}

impl RecoveryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            staleness_threshold: env_secs("RECOVERY_STALENESS_SECS")
                .unwrap_or(defaults.staleness_threshold),
            abandonment_threshold: env_secs("RECOVERY_ABANDONMENT_SECS")
                .unwrap_or(defaults.abandonment_threshold),
        }
    }
}

fn env_secs(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abandonment_exceeds_staleness() {
        let config = RecoveryConfig::default();
        assert!(config.abandonment_threshold > config.staleness_threshold);
    }
}
