//! # NoteWave Cache
//!
//! Named request/response cache generations backing the NoteWave offline
//! agent.
//!
//! ## Features
//!
//! - **Named caches**: `open()`, `delete()`, `names()`
//! - **URL matching**: per cache or across every cache
//! - **Atomic overwrite**: `replace()` swaps a whole generation at once
//!
//! Matching is by exact URL. Every stored response is keyed by the request
//! URL string; query strings and fragments are part of the key.

use std::collections::HashMap;
use std::sync::Arc;

use notewave_net::FetchResponse;
use tokio::sync::RwLock;
use tracing::{debug, trace};
use url::Url;

// ==================== Cache ====================

/// A single named cache of URL → response pairs.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name.
    name: String,

    /// Stored responses, keyed by request URL.
    entries: HashMap<String, FetchResponse>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Cache name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Match a URL. The returned copy is flagged as cache-served.
    pub fn match_url(&self, url: &Url) -> Option<FetchResponse> {
        self.entries.get(url.as_str()).map(|response| {
            let mut copy = response.clone();
            copy.from_cache = true;
            copy
        })
    }

    /// Store a response, replacing any previous entry for the URL.
    pub fn put(&mut self, url: &Url, response: FetchResponse) {
        self.entries.insert(url.as_str().to_string(), response);
    }

    /// Delete an entry.
    pub fn delete(&mut self, url: &Url) -> bool {
        self.entries.remove(url.as_str()).is_some()
    }

    /// All stored URLs.
    pub fn urls(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache Storage ====================

/// Shared handle to every named cache (the `caches` global).
///
/// Clones are cheap and all observe the same storage. Every operation takes
/// the storage lock once, so a `replace()` is atomic with respect to
/// concurrent matches.
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    caches: Arc<RwLock<HashMap<String, Cache>>>,
}

impl CacheStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache, creating it if it does not exist.
    pub async fn open(&self, name: &str) {
        let mut caches = self.caches.write().await;
        caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name));
    }

    /// Check if a cache exists.
    pub async fn has(&self, name: &str) -> bool {
        self.caches.read().await.contains_key(name)
    }

    /// Delete a whole cache. Returns whether it existed.
    pub async fn delete(&self, name: &str) -> bool {
        let deleted = self.caches.write().await.remove(name).is_some();
        if deleted {
            debug!(cache = %name, "Cache deleted");
        }
        deleted
    }

    /// Names of all live caches, sorted for deterministic iteration.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Store one response in the named cache, creating the cache on demand.
    pub async fn put(&self, name: &str, url: &Url, response: FetchResponse) {
        trace!(cache = %name, url = %url, "Cache put");
        let mut caches = self.caches.write().await;
        caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name))
            .put(url, response);
    }

    /// Replace the named cache's entire contents in one step.
    ///
    /// Re-running an install for a version that already has a cache must
    /// land on the same final state, so the swap never merges with what was
    /// there before.
    pub async fn replace(&self, name: &str, entries: Vec<(Url, FetchResponse)>) {
        debug!(cache = %name, entries = entries.len(), "Cache replaced");
        let mut fresh = Cache::new(name);
        for (url, response) in entries {
            fresh.put(&url, response);
        }
        self.caches.write().await.insert(name.to_string(), fresh);
    }

    /// Match a URL in one named cache.
    pub async fn match_in(&self, name: &str, url: &Url) -> Option<FetchResponse> {
        self.caches
            .read()
            .await
            .get(name)
            .and_then(|cache| cache.match_url(url))
    }

    /// Match a URL across every cache, in sorted name order.
    pub async fn match_any(&self, url: &Url) -> Option<FetchResponse> {
        let caches = self.caches.read().await;
        let mut names: Vec<&String> = caches.keys().collect();
        names.sort();
        for name in names {
            if let Some(response) = caches.get(name).and_then(|cache| cache.match_url(url)) {
                return Some(response);
            }
        }
        None
    }

    /// Stored URLs in one named cache.
    pub async fn urls(&self, name: &str) -> Vec<String> {
        self.caches
            .read()
            .await
            .get(name)
            .map(|cache| cache.urls())
            .unwrap_or_default()
    }

    /// Number of entries in one named cache; zero if it does not exist.
    pub async fn entry_count(&self, name: &str) -> usize {
        self.caches
            .read()
            .await
            .get(name)
            .map(|cache| cache.len())
            .unwrap_or(0)
    }
}
