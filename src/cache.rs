//! The response cache consumed by the HTTP layer.
//!
//! Cached values are serialized response bodies keyed by `prefix + path(?query)`. The store never
//! reads from the cache; it is a pure read-through for GET endpoints, and writes evict the keys
//! they make stale.

use std::fmt::Debug;
use std::time::{Duration, Instant};

use quick_cache::{sync::Cache, Weighter};
use tracing::debug;

use crate::metrics::{RESPONSE_CACHE_EVICTIONS, RESPONSE_CACHE_LOOKUPS};
use crate::RecordId;

/// A string cache with per-entry expiry.
pub trait ResponseCache: Send + Sync + Debug {
    /// Returns the live value under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores `value` under `key` for `ttl`, replacing any previous value.
    fn set_with_ttl(&self, key: &str, value: String, ttl: Duration);

    /// Removes `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str);
}

#[derive(Clone, Debug)]
struct CachedResponse {
    body: String,
    expires_at: Instant,
}

/// Weighs entries by their approximate heap footprint.
#[derive(Clone, Debug)]
struct ResponseWeighter;

impl Weighter<String, CachedResponse> for ResponseWeighter {
    fn weight(&self, key: &String, value: &CachedResponse) -> u64 {
        // Two `String` headers plus the `Instant`, then the heap bytes.
        (key.len() + value.body.len()) as u64 + 64
    }
}

/// In-process [`ResponseCache`] bounded by total weight.
pub struct MemoryResponseCache {
    entries: Cache<String, CachedResponse, ResponseWeighter>,
}

impl Debug for MemoryResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryResponseCache")
            .field("len", &self.entries.len())
            .field("weight", &self.entries.weight())
            .finish()
    }
}

impl MemoryResponseCache {
    /// Creates a cache holding at most roughly `capacity_bytes` of keys and bodies.
    pub fn new(capacity_bytes: u64) -> Self {
        // Sized for listing pages of a few KiB each.
        let estimated_items = usize::try_from(capacity_bytes / 4096).unwrap_or(usize::MAX);
        Self {
            entries: Cache::with_weighter(estimated_items.max(16), capacity_bytes, ResponseWeighter),
        }
    }

    /// Number of entries currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ResponseCache for MemoryResponseCache {
    fn get(&self, key: &str) -> Option<String> {
        let Some(entry) = self.entries.get(key) else {
            RESPONSE_CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
            return None;
        };
        if entry.expires_at <= Instant::now() {
            self.entries.remove(key);
            RESPONSE_CACHE_LOOKUPS.with_label_values(&["expired"]).inc();
            return None;
        }
        RESPONSE_CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
        Some(entry.body)
    }

    fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries.insert(
            key.to_string(),
            CachedResponse {
                body: value,
                expires_at,
            },
        );
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}

/// Builds cache keys and evicts the ones a write makes stale.
#[derive(Clone, Debug)]
pub struct CacheKeys {
    prefix: String,
}

impl CacheKeys {
    /// Keys are `prefix` followed by the request path.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Key for a request path, including its query string if any.
    pub fn for_path(&self, path_and_query: &str) -> String {
        format!("{}{}", self.prefix, path_and_query)
    }

    /// Key of the unparameterized listing of `resource`, e.g. `/api/users`.
    pub fn listing(&self, resource: &str) -> String {
        self.for_path(&format!("/api/{resource}"))
    }

    /// Key of one record of `resource`, e.g. `/api/users/7`.
    pub fn record(&self, resource: &str, id: RecordId) -> String {
        self.for_path(&format!("/api/{resource}/{id}"))
    }

    /// Key of a user's latest order view.
    pub fn latest_order(&self, user_id: RecordId) -> String {
        self.for_path(&format!("/api/users/{user_id}/orders/latest"))
    }

    /// Evicts the listing of `resource` and, when given, the single-record key of `id`.
    ///
    /// Listing pages requested with a cursor are not evicted and expire by TTL.
    pub fn invalidate(&self, cache: &dyn ResponseCache, resource: &str, id: Option<RecordId>) {
        cache.delete(&self.listing(resource));
        let mut evicted = 1;
        if let Some(id) = id {
            cache.delete(&self.record(resource, id));
            evicted += 1;
        }
        RESPONSE_CACHE_EVICTIONS
            .with_label_values(&[resource])
            .inc_by(evicted);
        debug!(resource, ?id, "Evicted cached responses");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn get_returns_what_was_set() {
        let cache = MemoryResponseCache::new(1 << 20);
        assert_eq!(None, cache.get("a"));
        cache.set_with_ttl("a", "{}".to_string(), TTL);
        assert_eq!(Some("{}".to_string()), cache.get("a"));
        cache.set_with_ttl("a", "[]".to_string(), TTL);
        assert_eq!(Some("[]".to_string()), cache.get("a"));
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let cache = MemoryResponseCache::new(1 << 20);
        cache.set_with_ttl("a", "{}".to_string(), Duration::ZERO);
        assert_eq!(1, cache.len());
        assert_eq!(None, cache.get("a"));
        assert!(cache.is_empty());
    }

    #[test]
    fn delete_missing_key_is_a_no_op() {
        let cache = MemoryResponseCache::new(1 << 20);
        cache.delete("nothing");
        cache.set_with_ttl("a", "{}".to_string(), TTL);
        cache.delete("a");
        assert_eq!(None, cache.get("a"));
    }

    #[test]
    fn invalidate_evicts_listing_and_record_only() {
        let cache = MemoryResponseCache::new(1 << 20);
        let keys = CacheKeys::new("__test__");
        let listing = keys.listing("users");
        let record = keys.record("users", RecordId(3));
        let paged = keys.for_path("/api/users?cursor=10");
        for key in [&listing, &record, &paged] {
            cache.set_with_ttl(key, "{}".to_string(), TTL);
        }
        assert_eq!("__test__/api/users/3", record);

        keys.invalidate(&cache, "users", Some(RecordId(3)));
        assert_eq!(None, cache.get(&listing));
        assert_eq!(None, cache.get(&record));
        assert!(cache.get(&paged).is_some());
    }
}
