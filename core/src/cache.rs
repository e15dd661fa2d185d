//! Cache-aside protocol over a pluggable key/value cache.
//!
//! # Design
//! `CacheAsideStore` owns the ordering rules; a `CacheBackend` only stores
//! values. The store takes no locks. The backend must be thread-safe, and two
//! concurrent misses for one key may both hit the network and both write the
//! cache. Both writes carry the same server state, so the last one winning is
//! harmless.
//!
//! Writes on the read path happen after the remote future has resolved and in
//! the same poll, so a caller dropping a pending call never leaves a partial
//! entry behind. Saves and deletes are optimistic: the cache is updated first
//! and is not reconciled with (or restored after) the server's answer.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tracing::trace;

use crate::error::WeebError;
use crate::types::SettingData;

/// Largest setting document the service accepts, in serialized bytes.
pub const MAX_DOCUMENT_SIZE: usize = 10 * 1024;

/// Storage behind a `CacheAsideStore`.
///
/// `get` must return an owned copy: callers may mutate what they receive
/// without affecting the stored entry.
pub trait CacheBackend<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn put(&self, key: K, value: V);
    fn invalidate(&self, key: &K);
}

/// A value that can be cached and size-checked.
pub trait Document: Clone + Send + Sync + 'static {
    /// Size of the value as it would be sent over the wire.
    fn encoded_len(&self) -> Result<usize, WeebError>;
}

impl Document for SettingData {
    fn encoded_len(&self) -> Result<usize, WeebError> {
        serde_json::to_vec(self)
            .map(|bytes| bytes.len())
            .map_err(|e| WeebError::Serialization(e.to_string()))
    }
}

impl Document for Bytes {
    fn encoded_len(&self) -> Result<usize, WeebError> {
        Ok(self.len())
    }
}

/// Cache key of a setting or sub-setting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Setting {
        kind: String,
        id: String,
    },
    SubSetting {
        parent_kind: String,
        parent_id: String,
        kind: String,
        id: String,
    },
}

impl SettingKey {
    pub fn setting(kind: impl Into<String>, id: impl Into<String>) -> Self {
        SettingKey::Setting {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn sub_setting(
        parent_kind: impl Into<String>,
        parent_id: impl Into<String>,
        kind: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        SettingKey::SubSetting {
            parent_kind: parent_kind.into(),
            parent_id: parent_id.into(),
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            SettingKey::Setting { kind, .. } | SettingKey::SubSetting { kind, .. } => kind,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            SettingKey::Setting { id, .. } | SettingKey::SubSetting { id, .. } => id,
        }
    }

    /// `(parent type, parent id)` of a sub-setting.
    pub fn parent(&self) -> Option<(&str, &str)> {
        match self {
            SettingKey::Setting { .. } => None,
            SettingKey::SubSetting {
                parent_kind,
                parent_id,
                ..
            } => Some((parent_kind, parent_id)),
        }
    }

    /// Path segments in URL order.
    pub fn segments(&self) -> Vec<&str> {
        match self {
            SettingKey::Setting { kind, id } => vec![kind.as_str(), id.as_str()],
            SettingKey::SubSetting {
                parent_kind,
                parent_id,
                kind,
                id,
            } => vec![
                parent_kind.as_str(),
                parent_id.as_str(),
                kind.as_str(),
                id.as_str(),
            ],
        }
    }
}

/// Backend that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

impl<K, V> CacheBackend<K, V> for NoopCache {
    fn get(&self, _key: &K) -> Option<V> {
        None
    }

    fn put(&self, _key: K, _value: V) {}

    fn invalidate(&self, _key: &K) {}
}

/// Unbounded in-process backend.
#[derive(Debug)]
pub struct MemoryCache<K: Eq + Hash, V> {
    entries: DashMap<K, V>,
}

impl<K: Eq + Hash, V> Default for MemoryCache<K, V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<K: Eq + Hash + Clone, V> MemoryCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

impl<K, V> CacheBackend<K, V> for MemoryCache<K, V>
where
    K: Eq + Hash + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn put(&self, key: K, value: V) {
        self.entries.insert(key, value);
    }

    fn invalidate(&self, key: &K) {
        self.entries.remove(key);
    }
}

/// Read-through, write-through and invalidate rules over a backend.
pub struct CacheAsideStore<K, V> {
    name: &'static str,
    backend: Arc<dyn CacheBackend<K, V>>,
}

impl<K, V> Clone for CacheAsideStore<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            backend: self.backend.clone(),
        }
    }
}

impl<K, V> std::fmt::Debug for CacheAsideStore<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheAsideStore")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<K, V> CacheAsideStore<K, V>
where
    K: Debug + Clone + Send + Sync,
    V: Document,
{
    pub fn new(name: &'static str, backend: Arc<dyn CacheBackend<K, V>>) -> Self {
        Self { name, backend }
    }

    /// Store that caches nothing but still enforces the save guard.
    pub fn disabled(name: &'static str) -> Self {
        Self::new(name, Arc::new(NoopCache))
    }

    /// Look `key` up without any remote fallback.
    pub fn cached(&self, key: &K) -> Option<V> {
        self.backend.get(key)
    }

    /// Return the cached value, or call `remote` and cache what it found.
    ///
    /// `Ok(None)` (not found upstream) and errors leave the cache untouched.
    pub async fn fetch<F, Fut>(&self, key: &K, remote: F) -> Result<Option<V>, WeebError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, WeebError>>,
    {
        if let Some(hit) = self.backend.get(key) {
            trace!(cache = self.name, ?key, "cache hit");
            return Ok(Some(hit));
        }
        trace!(cache = self.name, ?key, "cache miss");
        let fetched = remote().await?;
        if let Some(value) = &fetched {
            self.backend.put(key.clone(), value.clone());
            trace!(cache = self.name, ?key, "cache populated");
        }
        Ok(fetched)
    }

    /// Read path of the image store. `supplier` is a download that only runs
    /// on a miss; a missing image (`Ok(None)`) is not cached.
    pub async fn get_or_compute<F, Fut>(&self, key: &K, supplier: F) -> Result<Option<V>, WeebError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>, WeebError>>,
    {
        self.fetch(key, supplier).await
    }

    /// Write `document` to the cache, then call `remote`.
    ///
    /// Documents over `MAX_DOCUMENT_SIZE` are rejected before either happens.
    /// The cache keeps `document` whatever `remote` returns.
    pub async fn save<F, Fut, R>(&self, key: K, document: V, remote: F) -> Result<R, WeebError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, WeebError>>,
    {
        let size = document.encoded_len()?;
        if size > MAX_DOCUMENT_SIZE {
            return Err(WeebError::DocumentTooLarge {
                size,
                limit: MAX_DOCUMENT_SIZE,
            });
        }
        trace!(cache = self.name, ?key, size, "optimistic cache write");
        self.backend.put(key, document);
        remote().await
    }

    /// Invalidate `key`, then call `remote`. The entry is not restored if
    /// `remote` fails.
    pub async fn remove<F, Fut, R>(&self, key: &K, remote: F) -> Result<R, WeebError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R, WeebError>>,
    {
        trace!(cache = self.name, ?key, "invalidate");
        self.backend.invalidate(key);
        remote().await
    }
}
