use std::hash::Hash;
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Bounded, TTL-evicting cache. The engine may run as several instances
/// behind a load balancer, so nothing authoritative lives here: entries are
/// hints that expire, and the map never grows past `capacity`.
pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    capacity: usize,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            ttl,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            self.evict_expired();
            if self.entries.len() >= self.capacity {
                self.evict_one();
            }
        }
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    // Capacity pressure with nothing expired: drop the entry closest to
    // expiry. Scans the map, acceptable at the small capacities this cache
    // is configured with.
    fn evict_one(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().expires_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = victim {
            self.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_inserted_value_before_ttl() {
        let cache = TtlCache::new(4, Duration::from_secs(60));
        cache.insert("u1".to_string(), 42u64);
        assert_eq!(cache.get(&"u1".to_string()), Some(42));
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let cache = TtlCache::new(4, Duration::from_millis(5));
        cache.insert("u1".to_string(), 1u64);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&"u1".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let cache = TtlCache::new(3, Duration::from_secs(60));
        for i in 0..10u64 {
            cache.insert(format!("user-{i}"), i);
        }
        assert!(cache.len() <= 3);
    }

    #[test]
    fn reinserting_existing_key_does_not_evict_others() {
        let cache = TtlCache::new(2, Duration::from_secs(60));
        cache.insert("a".to_string(), 1u64);
        cache.insert("b".to_string(), 2u64);
        cache.insert("a".to_string(), 3u64);
        assert_eq!(cache.get(&"a".to_string()), Some(3));
        assert_eq!(cache.get(&"b".to_string()), Some(2));
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = TtlCache::new(4, Duration::from_secs(60));
        cache.insert("u1".to_string(), 7u64);
        cache.invalidate(&"u1".to_string());
        assert_eq!(cache.get(&"u1".to_string()), None);
    }
}
