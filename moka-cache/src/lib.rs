//! Bounded cache backend for `weebsh-core` built on `moka`.
//!
//! `MokaCache` plugs into `WeebClient::with_setting_cache` or
//! `WeebClient::with_image_cache`. Entries are evicted by capacity and,
//! when configured, by time-to-live or time-to-idle. Eviction only ever
//! causes an extra network round-trip: the client treats a missing entry as
//! a miss.

use std::hash::Hash;
use std::time::Duration;

use moka::sync::Cache;
use tracing::trace;
use weebsh_core::CacheBackend;

/// Sizing and expiry for a `MokaCache`.
#[derive(Debug, Clone)]
pub struct MokaCacheConfig {
    /// Maximum number of entries.
    pub max_capacity: u64,
    pub time_to_live: Option<Duration>,
    /// Entries not read for this long are evicted.
    pub time_to_idle: Option<Duration>,
}

impl Default for MokaCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 10_000,
            time_to_live: None,
            time_to_idle: None,
        }
    }
}

impl MokaCacheConfig {
    pub fn with_max_capacity(mut self, capacity: u64) -> Self {
        self.max_capacity = capacity;
        self
    }

    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    pub fn with_time_to_idle(mut self, tti: Duration) -> Self {
        self.time_to_idle = Some(tti);
        self
    }
}

/// Thread-safe bounded cache.
#[derive(Debug, Clone)]
pub struct MokaCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache: Cache<K, V>,
}

impl<K, V> MokaCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Capacity-bounded cache without expiry.
    pub fn new(max_capacity: u64) -> Self {
        Self::with_config(MokaCacheConfig::default().with_max_capacity(max_capacity))
    }

    pub fn with_config(config: MokaCacheConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_capacity);
        if let Some(ttl) = config.time_to_live {
            builder = builder.time_to_live(ttl);
        }
        if let Some(tti) = config.time_to_idle {
            builder = builder.time_to_idle(tti);
        }
        Self {
            cache: builder.build(),
        }
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Apply pending evictions and bookkeeping now.
    pub fn sync(&self) {
        self.cache.run_pending_tasks();
    }
}

impl<K, V> CacheBackend<K, V> for MokaCache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<V> {
        self.cache.get(key)
    }

    fn put(&self, key: K, value: V) {
        self.cache.insert(key, value);
        trace!(entries = self.cache.entry_count(), "moka insert");
    }

    fn invalidate(&self, key: &K) {
        self.cache.invalidate(key);
    }
}
