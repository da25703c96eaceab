//! Identity resolver with a last-known plan cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use lumen_models::{CycleInfo, UserKey};

use crate::entitlement::{EntitlementProvider, ResolvedIdentity};
use crate::error::{IdentityError, IdentityResult};

/// Resolves the durable user key and plan details.
///
/// Gating paths fail closed: if the provider is unreachable, features that
/// require entitlement deny access. Read-only display fails open to the
/// last-known cached plan details.
#[derive(Clone)]
pub struct IdentityResolver {
    provider: Arc<dyn EntitlementProvider>,
    plan_cache: Arc<Mutex<HashMap<UserKey, CycleInfo>>>,
}

impl IdentityResolver {
    /// Create a resolver over an entitlement provider.
    pub fn new(provider: Arc<dyn EntitlementProvider>) -> Self {
        Self {
            provider,
            plan_cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Resolve the caller's durable key.
    pub async fn resolve(&self) -> IdentityResult<ResolvedIdentity> {
        let identity = self
            .provider
            .resolve_identity()
            .await
            .map_err(|e| IdentityError::unresolvable(e.to_string()))?;

        debug!(
            user_key = %identity.key,
            entitled = identity.entitled,
            anonymous = identity.key.is_anonymous(),
            "Resolved identity"
        );
        Ok(identity)
    }

    /// Whether a key is entitled, derived from its form: anonymous keys are
    /// not entitled, purchase-backed keys are.
    pub fn is_entitled(&self, key: &UserKey) -> bool {
        key.is_purchase_backed()
    }

    /// Plan details for gating decisions. Fails closed: a provider error is
    /// returned to the caller, which must deny the gated feature.
    pub async fn plan_details(&self, key: &UserKey) -> IdentityResult<CycleInfo> {
        match self.provider.plan_details(key).await {
            Ok(cycle) => {
                let mut cache = self.plan_cache.lock().expect("plan cache lock poisoned");
                cache.insert(key.clone(), cycle.clone());
                Ok(cycle)
            }
            Err(e) => {
                warn!(user_key = %key, error = %e, "Plan details unavailable, failing closed");
                Err(e.into())
            }
        }
    }

    /// Plan details for read-only display. Fails open: a provider error
    /// falls back to the last-known cached value, if any.
    pub async fn cached_plan_details(&self, key: &UserKey) -> Option<CycleInfo> {
        match self.provider.plan_details(key).await {
            Ok(cycle) => {
                let mut cache = self.plan_cache.lock().expect("plan cache lock poisoned");
                cache.insert(key.clone(), cycle.clone());
                Some(cycle)
            }
            Err(e) => {
                debug!(user_key = %key, error = %e, "Using cached plan details for display");
                let cache = self.plan_cache.lock().expect("plan cache lock poisoned");
                cache.get(key).cloned()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlement::{EntitlementError, EntitlementResult};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use lumen_models::PlanTier;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeEntitlements {
        key: UserKey,
        offline: AtomicBool,
    }

    impl FakeEntitlements {
        fn new(key: UserKey) -> Self {
            Self {
                key,
                offline: AtomicBool::new(false),
            }
        }

        fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        fn cycle(&self) -> CycleInfo {
            let now = Utc::now();
            CycleInfo {
                plan: PlanTier::Monthly,
                usage_limit: 150,
                cycle_anchor: now,
                next_reset_at: now + Duration::days(30),
                cycle_token: Some("txn-1".into()),
            }
        }
    }

    #[async_trait]
    impl EntitlementProvider for FakeEntitlements {
        async fn resolve_identity(&self) -> EntitlementResult<ResolvedIdentity> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(EntitlementError::unreachable("network down"));
            }
            Ok(ResolvedIdentity {
                key: self.key.clone(),
                entitled: self.key.is_purchase_backed(),
            })
        }

        async fn plan_details(&self, _key: &UserKey) -> EntitlementResult<CycleInfo> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(EntitlementError::unreachable("network down"));
            }
            Ok(self.cycle())
        }
    }

    #[tokio::test]
    async fn test_resolve_reports_purchase_backed_identity() {
        let provider = Arc::new(FakeEntitlements::new(UserKey::purchase("t1")));
        let resolver = IdentityResolver::new(provider);

        let identity = resolver.resolve().await.unwrap();
        assert!(identity.entitled);
        assert!(resolver.is_entitled(&identity.key));
    }

    #[tokio::test]
    async fn test_anonymous_identity_is_not_entitled() {
        let provider = Arc::new(FakeEntitlements::new(UserKey::anonymous("device-1")));
        let resolver = IdentityResolver::new(provider);

        let identity = resolver.resolve().await.unwrap();
        assert!(!resolver.is_entitled(&identity.key));
    }

    #[tokio::test]
    async fn test_gating_fails_closed_when_provider_unreachable() {
        let provider = Arc::new(FakeEntitlements::new(UserKey::purchase("t1")));
        provider.set_offline(true);
        let resolver = IdentityResolver::new(provider.clone());

        assert!(resolver.resolve().await.is_err());
        assert!(resolver.plan_details(&UserKey::purchase("t1")).await.is_err());
    }

    #[tokio::test]
    async fn test_display_fails_open_to_cached_values() {
        let key = UserKey::purchase("t1");
        let provider = Arc::new(FakeEntitlements::new(key.clone()));
        let resolver = IdentityResolver::new(provider.clone());

        // Prime the cache while online.
        resolver.plan_details(&key).await.unwrap();

        provider.set_offline(true);
        let cached = resolver.cached_plan_details(&key).await;
        assert_eq!(cached.unwrap().cycle_token.as_deref(), Some("txn-1"));
    }

    #[tokio::test]
    async fn test_display_with_no_cache_and_no_provider_is_none() {
        let key = UserKey::purchase("t1");
        let provider = Arc::new(FakeEntitlements::new(key.clone()));
        provider.set_offline(true);
        let resolver = IdentityResolver::new(provider.clone());

        assert!(resolver.cached_plan_details(&key).await.is_none());
    }
}
