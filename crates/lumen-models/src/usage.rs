//! Usage records and billing-cycle information.
//!
//! One [`UsageRecord`] exists per stable identity key. The record tracks
//! consumed generation units for the current billing cycle, plus the cycle
//! fields needed to decide when the counter resets.

use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::key::UserKey;
use crate::plan::PlanTier;

/// Sentinel value for plans without a cycle limit.
pub const UNLIMITED_USAGE: u32 = u32::MAX;

/// Which limit denied a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LimitScope {
    /// The per-cycle limit was reached.
    Cycle,
    /// The one-per-day sub-limit was reached (cycle still has headroom).
    Daily,
}

impl LimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitScope::Cycle => "cycle",
            LimitScope::Daily => "daily",
        }
    }
}

impl std::fmt::Display for LimitScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing-cycle snapshot reported by the entitlement provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CycleInfo {
    /// Plan tier backing the cycle.
    pub plan: PlanTier,
    /// Generation units permitted for this cycle.
    pub usage_limit: u32,
    /// Start of the current billing cycle.
    pub cycle_anchor: DateTime<Utc>,
    /// When the cycle rolls over.
    pub next_reset_at: DateTime<Utc>,
    /// Opaque identifier of the purchase/transaction backing the cycle.
    /// A changed token signals a renewal distinct from mere time passage.
    pub cycle_token: Option<String>,
}

/// Per-user usage counter record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UsageRecord {
    /// Stable identity token (primary key).
    pub user_key: UserKey,
    /// Units consumed in the current cycle.
    pub consumed_count: u32,
    /// Units permitted per cycle.
    pub usage_limit: u32,
    /// Plan tier.
    pub plan: PlanTier,
    /// Start of the current billing cycle.
    pub cycle_anchor: DateTime<Utc>,
    /// When the cycle rolls over.
    pub next_reset_at: DateTime<Utc>,
    /// Token backing the current cycle, if any.
    pub cycle_token: Option<String>,
    /// Calendar date of last consumption (daily sub-limit plans only).
    pub last_use_date: Option<NaiveDate>,
    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Create a fresh record for a key, adopting the given cycle.
    pub fn new(user_key: UserKey, cycle: &CycleInfo) -> Self {
        Self {
            user_key,
            consumed_count: 0,
            usage_limit: cycle.usage_limit,
            plan: cycle.plan,
            cycle_anchor: cycle.cycle_anchor,
            next_reset_at: cycle.next_reset_at,
            cycle_token: cycle.cycle_token.clone(),
            last_use_date: None,
            updated_at: Utc::now(),
        }
    }

    /// Whether the cycle limit is the unlimited sentinel.
    pub fn is_unlimited(&self) -> bool {
        self.usage_limit == UNLIMITED_USAGE
    }

    /// Units remaining in the current cycle.
    pub fn remaining(&self) -> u32 {
        self.usage_limit.saturating_sub(self.consumed_count)
    }

    /// Decide whether the record must reset before the next reservation.
    ///
    /// Tie-break rules, evaluated with OR semantics:
    /// 1. a new cycle token always wins, even mid-cycle (renewal/upgrade);
    /// 2. a record with no stored token is treated as fresh (un-migrated);
    /// 3. `now >= next_reset_at` as a fallback for passive renewals that
    ///    do not change the token.
    pub fn needs_reset(&self, cycle: &CycleInfo, now: DateTime<Utc>) -> bool {
        match (&self.cycle_token, &cycle.cycle_token) {
            (Some(stored), Some(incoming)) if stored != incoming => return true,
            (None, _) => return true,
            _ => {}
        }
        now >= self.next_reset_at
    }

    /// Adopt a new cycle: zero the counter, clear the last-use date, and
    /// take all cycle fields in one step. Callers must commit the whole
    /// record atomically so no partial mix of old count and new cycle
    /// fields can be observed.
    pub fn apply_reset(&mut self, cycle: &CycleInfo, now: DateTime<Utc>) {
        self.consumed_count = 0;
        self.usage_limit = cycle.usage_limit;
        self.plan = cycle.plan;
        self.cycle_anchor = cycle.cycle_anchor;
        self.next_reset_at = cycle.next_reset_at;
        self.cycle_token = cycle.cycle_token.clone();
        self.last_use_date = None;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn cycle(token: Option<&str>) -> CycleInfo {
        let now = Utc::now();
        CycleInfo {
            plan: PlanTier::Monthly,
            usage_limit: 150,
            cycle_anchor: now,
            next_reset_at: now + Duration::days(30),
            cycle_token: token.map(String::from),
        }
    }

    #[test]
    fn test_new_token_forces_reset_mid_cycle() {
        let mut record = UsageRecord::new(UserKey::purchase("t1"), &cycle(Some("txn-1")));
        record.consumed_count = 5;

        let renewed = cycle(Some("txn-2"));
        assert!(record.needs_reset(&renewed, Utc::now()));
    }

    #[test]
    fn test_missing_stored_token_forces_reset() {
        let mut record = UsageRecord::new(UserKey::purchase("t1"), &cycle(None));
        record.consumed_count = 2;
        assert!(record.needs_reset(&cycle(Some("txn-1")), Utc::now()));
    }

    #[test]
    fn test_clock_rollover_forces_reset_without_new_token() {
        let record = UsageRecord::new(UserKey::purchase("t1"), &cycle(Some("txn-1")));
        let past_reset = record.next_reset_at + Duration::seconds(1);
        assert!(record.needs_reset(&cycle(Some("txn-1")), past_reset));
    }

    #[test]
    fn test_same_token_mid_cycle_does_not_reset() {
        let record = UsageRecord::new(UserKey::purchase("t1"), &cycle(Some("txn-1")));
        assert!(!record.needs_reset(&cycle(Some("txn-1")), Utc::now()));
    }

    #[test]
    fn test_apply_reset_is_all_or_nothing() {
        let mut record = UsageRecord::new(UserKey::purchase("t1"), &cycle(Some("txn-1")));
        record.consumed_count = 7;
        record.last_use_date = Some(Utc::now().date_naive());

        let renewed = cycle(Some("txn-2"));
        record.apply_reset(&renewed, Utc::now());

        assert_eq!(record.consumed_count, 0);
        assert_eq!(record.last_use_date, None);
        assert_eq!(record.cycle_token.as_deref(), Some("txn-2"));
        assert_eq!(record.next_reset_at, renewed.next_reset_at);
    }

    #[test]
    fn test_unlimited_sentinel() {
        let mut info = cycle(Some("txn-1"));
        info.usage_limit = UNLIMITED_USAGE;
        let record = UsageRecord::new(UserKey::purchase("t1"), &info);
        assert!(record.is_unlimited());
        assert_eq!(record.remaining(), UNLIMITED_USAGE);
    }
}
