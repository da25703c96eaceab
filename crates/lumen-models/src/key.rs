//! Stable user identity keys.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix for keys backed by a stable purchase/transaction identifier.
const PURCHASE_PREFIX: &str = "txn:";

/// Prefix for provider-issued anonymous identifiers (changes per install).
const ANON_PREFIX: &str = "anon:";

/// Stable identity token used to key usage records and job ownership.
///
/// A key is either purchase-backed (stable across reinstalls and renewals)
/// or anonymous (per-install). The key form encodes which, so entitlement
/// can be derived without another provider round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct UserKey(pub String);

impl UserKey {
    /// Create a key from a stable purchase/transaction identifier.
    pub fn purchase(id: impl AsRef<str>) -> Self {
        Self(format!("{}{}", PURCHASE_PREFIX, id.as_ref()))
    }

    /// Create a key from a provider-issued anonymous identifier.
    pub fn anonymous(id: impl AsRef<str>) -> Self {
        Self(format!("{}{}", ANON_PREFIX, id.as_ref()))
    }

    /// Create from an already-formed key string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Whether this key is an anonymous (not purchase-backed) identity.
    pub fn is_anonymous(&self) -> bool {
        self.0.starts_with(ANON_PREFIX)
    }

    /// Whether this key is backed by a stable purchase identifier.
    pub fn is_purchase_backed(&self) -> bool {
        self.0.starts_with(PURCHASE_PREFIX)
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
