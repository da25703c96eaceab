//! Stable identity resolution over the entitlement provider.
//!
//! Maps whatever the entitlement provider currently reports (a stable
//! purchase identifier, or a per-install anonymous id) to the durable key
//! the quota ledger uses, and exposes plan details with fail-closed gating
//! and fail-open cached display.

pub mod entitlement;
pub mod error;
pub mod resolver;

pub use entitlement::{EntitlementError, EntitlementProvider, ResolvedIdentity};
pub use error::{IdentityError, IdentityResult};
pub use resolver::IdentityResolver;
