//! Entitlement provider interface.
//!
//! The billing/entitlement provider is an external collaborator; this crate
//! only consumes its output. Implementations wrap whatever SDK or backend
//! resolves subscriptions for the app.

use async_trait::async_trait;
use lumen_models::{CycleInfo, UserKey};
use thiserror::Error;

pub type EntitlementResult<T> = Result<T, EntitlementError>;

#[derive(Debug, Error)]
pub enum EntitlementError {
    /// The provider could not be reached.
    #[error("Entitlement provider unreachable: {0}")]
    Unreachable(String),

    /// The provider answered but without usable identity data.
    #[error("Entitlement response malformed: {0}")]
    Malformed(String),
}

impl EntitlementError {
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

/// The caller's current identity as reported by the provider.
#[derive(Debug, Clone)]
pub struct ResolvedIdentity {
    /// Durable ledger key. Purchase-backed when a stable identifier exists,
    /// otherwise the provider's anonymous id as-is — never a guess that
    /// could merge two people's usage.
    pub key: UserKey,
    /// Whether the identity is backed by an active purchase.
    pub entitled: bool,
}

/// External entitlement provider.
#[async_trait]
pub trait EntitlementProvider: Send + Sync {
    /// Resolve the caller's current identity.
    ///
    /// Implementations prefer a stable purchase/transaction identifier
    /// (stable across reinstalls and renewals) and fall back to the
    /// provider-issued anonymous identifier when none exists.
    async fn resolve_identity(&self) -> EntitlementResult<ResolvedIdentity>;

    /// Current plan details for a key: tier, limit, and billing-cycle
    /// boundaries with the cycle-identifying token.
    async fn plan_details(&self, key: &UserKey) -> EntitlementResult<CycleInfo>;
}
