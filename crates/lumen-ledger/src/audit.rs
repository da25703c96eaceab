//! Usage audit trail.
//!
//! Every committed reservation and rollback is recorded as a
//! [`UsageEvent`]. Recording is fire-and-forget: failures are logged and
//! never block or fail the reservation path.

use chrono::{DateTime, Utc};
use lumen_models::UserKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the ledger did to the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageAction {
    /// A unit was reserved ahead of a provider call.
    Reserve,
    /// A reservation was reversed after a confirmed failure or cancel.
    Rollback,
}

impl UsageAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageAction::Reserve => "reserve",
            UsageAction::Rollback => "rollback",
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Unique event id.
    pub id: String,
    /// Key the counter belongs to.
    pub user_key: UserKey,
    /// Reserve or rollback.
    pub action: UsageAction,
    /// Counter value after the action committed.
    pub consumed_after: u32,
    /// When the action committed.
    pub at: DateTime<Utc>,
}

impl UsageEvent {
    pub fn new(user_key: UserKey, action: UsageAction, consumed_after: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_key,
            action,
            consumed_after,
            at: Utc::now(),
        }
    }
}
