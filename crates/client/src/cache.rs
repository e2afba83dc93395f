//! Pluggable external cache.
//!
//! The SDK keeps its own in-process caches for the category tree and facet
//! index. An external [`CacheStore`] additionally persists raw product and
//! catalog payloads across client instances, e.g. behind a web worker fleet.
//! [`MemoryCache`] is the bundled implementation; a Redis or memcached store
//! only needs to implement the trait.

use std::time::Duration;

use async_trait::async_trait;

/// A byte-oriented cache backend.
///
/// All operations are best effort: the SDK treats a miss and a backend
/// failure the same way and falls through to the API.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up `key`, returning the stored bytes on a hit.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `value` under `key`. `ttl` is advisory; backends with a
    /// fixed expiry policy may ignore it.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);

    /// Drop `key` if present.
    async fn delete(&self, key: &str);
}

/// In-process [`CacheStore`] backed by a bounded moka cache.
///
/// The TTL is fixed at construction time; the per-call `ttl` argument is
/// ignored since moka applies a cache-wide time-to-live.
pub struct MemoryCache {
    entries: moka::future::Cache<String, Vec<u8>>,
}

impl MemoryCache {
    /// Create a cache holding up to `capacity` entries expiring after `ttl`.
    #[must_use]
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            entries: moka::future::Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.entries.entry_count())
            .finish()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, _ttl: Duration) {
        self.entries.insert(key.to_string(), value).await;
    }

    async fn delete(&self, key: &str) {
        self.entries.invalidate(key).await;
    }
}
