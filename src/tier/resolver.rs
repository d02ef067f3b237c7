use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::storage::{StoreHandle, StoreUnavailable};

use super::Tier;

/// Outcome of a tier lookup. "No record" and "store unreachable" are kept
/// apart: the first is a legitimate first-time default, the second triggers
/// the fail-open admission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierLookup {
    Assigned(Tier),
    DefaultFree,
    Unavailable,
}

impl TierLookup {
    pub fn tier(&self) -> Tier {
        match self {
            TierLookup::Assigned(tier) => *tier,
            TierLookup::DefaultFree | TierLookup::Unavailable => Tier::Free,
        }
    }
}

/// Resolves a user's subscription tier from the store through a bounded TTL
/// cache. The store row is authoritative and written by the subscription
/// collaborator; cached values are short-lived hints.
pub struct TierResolver {
    store: StoreHandle,
    cache: TtlCache<String, Tier>,
}

impl TierResolver {
    pub fn new(store: StoreHandle, cache_capacity: usize, cache_ttl: Duration) -> Self {
        Self {
            store,
            cache: TtlCache::new(cache_capacity, cache_ttl),
        }
    }

    pub async fn resolve(&self, user_id: &str) -> TierLookup {
        if let Some(tier) = self.cache.get(&user_id.to_string()) {
            return TierLookup::Assigned(tier);
        }

        let user = user_id.to_string();
        match self.store.run(move |db| db.get_tier(&user)).await {
            Ok(Some(tier)) => {
                self.cache.insert(user_id.to_string(), tier);
                TierLookup::Assigned(tier)
            }
            Ok(None) => {
                // Absence is not cached: the authoritative record may be
                // written at any moment.
                debug!(user_id, "no tier record, defaulting to free");
                TierLookup::DefaultFree
            }
            Err(err) => {
                warn!(user_id, error = %err, "tier lookup failed");
                TierLookup::Unavailable
            }
        }
    }

    pub async fn assign(&self, user_id: &str, tier: Tier) -> Result<(), StoreUnavailable> {
        let user = user_id.to_string();
        self.store.run(move |db| db.set_tier(&user, tier)).await?;
        self.cache.insert(user_id.to_string(), tier);
        Ok(())
    }
}
