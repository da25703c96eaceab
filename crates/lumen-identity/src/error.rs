//! Identity resolution error types.

use thiserror::Error;

use crate::entitlement::EntitlementError;

pub type IdentityResult<T> = Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    /// No identity could be resolved; features gated on identity must deny.
    #[error("Identity unresolvable: {0}")]
    Unresolvable(String),

    #[error("Entitlement error: {0}")]
    Entitlement(#[from] EntitlementError),
}

impl IdentityError {
    pub fn unresolvable(msg: impl Into<String>) -> Self {
        Self::Unresolvable(msg.into())
    }
}
