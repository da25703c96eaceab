//! Plan configuration and per-tier generation limits.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Generation units permitted per cycle for each plan tier.
pub const FREE_CYCLE_LIMIT: u32 = 3;
pub const WEEKLY_CYCLE_LIMIT: u32 = 30;
pub const MONTHLY_CYCLE_LIMIT: u32 = 150;

/// Plan tier enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    #[default]
    Free,
    Weekly,
    Monthly,
}

impl PlanTier {
    /// Parse from string (case-insensitive).
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "weekly" => PlanTier::Weekly,
            "monthly" => PlanTier::Monthly,
            _ => PlanTier::Free,
        }
    }

    /// Generation units permitted per billing cycle for this tier.
    pub fn cycle_limit(&self) -> u32 {
        match self {
            PlanTier::Free => FREE_CYCLE_LIMIT,
            PlanTier::Weekly => WEEKLY_CYCLE_LIMIT,
            PlanTier::Monthly => MONTHLY_CYCLE_LIMIT,
        }
    }

    /// Whether this tier carries a one-per-day sub-limit on top of the
    /// cycle limit.
    pub fn daily_limited(&self) -> bool {
        matches!(self, PlanTier::Free)
    }

    /// Get the plan name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Weekly => "weekly",
            PlanTier::Monthly => "monthly",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Plan limits configuration, for display and gating.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PlanLimits {
    /// Plan identifier.
    pub plan_id: String,
    /// Generation units permitted per billing cycle.
    pub cycle_limit: u32,
    /// Whether a one-per-day sub-limit applies.
    pub daily_limited: bool,
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self::for_tier(PlanTier::Free)
    }
}

impl PlanLimits {
    /// Create limits for a specific plan tier.
    pub fn for_tier(tier: PlanTier) -> Self {
        Self {
            plan_id: tier.as_str().to_string(),
            cycle_limit: tier.cycle_limit(),
            daily_limited: tier.daily_limited(),
        }
    }
}
