//! Search response cache
//!
//! Responses are stored as JSON strings under `search:<cacheKey>` with a
//! fixed expiry. An optional background sweeper deletes cache keys whose
//! remaining lifetime is non-positive.

use crate::config::CacheConfig;
use crate::error::{Result, WatchProError};
use crate::store::KvStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Key prefix of every cache entry
pub const CACHE_PREFIX: &str = "search:";

/// Cache of upstream search responses
#[derive(Clone)]
pub struct SearchCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
}

impl SearchCache {
    /// Create a cache whose entries expire after `ttl`
    ///
    /// # Arguments
    ///
    /// * `store` - Backend for cache entries
    /// * `ttl` - Lifetime applied to every entry written by [`SearchCache::put`]
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Create a cache from configuration
    pub fn from_config(store: Arc<dyn KvStore>, config: &CacheConfig) -> Self {
        Self::new(store, Duration::from_secs(config.ttl_seconds))
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Full store key of an advanced-search request
    ///
    /// Domain lists are joined with commas, so `["a.com", "b.com"]` and a
    /// single `"a.com,b.com"` entry share a key.
    ///
    /// # Examples
    ///
    /// ```
    /// use watchpro::cache::SearchCache;
    ///
    /// let key = SearchCache::search_key("rolex", 10, "basic", &["rolex.com".into()], &[]);
    /// assert_eq!(key, "search:rolex:10:basic:rolex.com:");
    /// ```
    pub fn search_key(
        query: &str,
        max_results: i64,
        search_depth: &str,
        include_domains: &[String],
        exclude_domains: &[String],
    ) -> String {
        format!(
            "{}{}:{}:{}:{}:{}",
            CACHE_PREFIX,
            query,
            max_results,
            search_depth,
            include_domains.join(","),
            exclude_domains.join(",")
        )
    }

    /// Look up a cached value
    ///
    /// An entry that no longer deserializes is treated as a miss.
    ///
    /// # Returns
    ///
    /// Returns the decoded value, or `None` on a miss
    ///
    /// # Errors
    ///
    /// Returns error only if the store itself fails
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.store.get(key).await? else {
            tracing::debug!("Cache miss: {}", key);
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                tracing::debug!("Cache hit: {}", key);
                Ok(Some(value))
            }
            Err(e) => {
                tracing::warn!("Discarding malformed cache entry {}: {}", key, e);
                Ok(None)
            }
        }
    }

    /// Store a value with the cache expiry
    ///
    /// # Errors
    ///
    /// Returns `WatchProError::Serialization` if `value` has no JSON form,
    /// or a storage error if the write fails
    pub async fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value).map_err(WatchProError::from)?;
        self.store.set(key, &raw, Some(self.ttl)).await
    }

    /// Delete cache keys whose time to live is non-positive
    ///
    /// Returns the number of keys deleted.
    pub async fn sweep(&self) -> Result<usize> {
        let keys = self.store.scan_prefix(CACHE_PREFIX).await?;
        let mut deleted = 0;

        for key in keys {
            if self.store.ttl(&key).await?.is_sweepable() && self.store.del(&key).await? {
                deleted += 1;
            }
        }

        if deleted > 0 {
            tracing::info!("Cache sweep removed {} keys", deleted);
        }
        Ok(deleted)
    }

    /// Run [`SearchCache::sweep`] every `interval` on a background task
    ///
    /// The task stops when the returned handle is shut down or dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> SweeperHandle {
        let cache = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = cache.sweep().await {
                    tracing::error!("Cache sweep failed: {}", e);
                }
            }
        });

        tracing::info!("Started cache sweeper with interval {:?}", interval);
        SweeperHandle { handle }
    }
}

/// Owner of the background sweep task
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper
    pub fn shutdown(self) {
        // Drop aborts.
    }

    /// Whether the task has stopped
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
        tracing::debug!("Cache sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LocalStore;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn cache(ttl: Duration) -> (SearchCache, Arc<dyn KvStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn KvStore> = Arc::new(LocalStore::open(dir.path().join("s")).unwrap());
        (SearchCache::new(store.clone(), ttl), store, dir)
    }

    #[test]
    fn test_search_key_format() {
        let key = SearchCache::search_key(
            "omega",
            5,
            "advanced",
            &["a.com".into(), "b.com".into()],
            &["c.com".into()],
        );
        assert_eq!(key, "search:omega:5:advanced:a.com,b.com:c.com");
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let (cache, _store, _dir) = cache(Duration::from_secs(3600));
        cache.put("search:k", &json!({"results": []})).await.unwrap();
        let value: Option<Value> = cache.get("search:k").await.unwrap();
        assert_eq!(value, Some(json!({"results": []})));
    }

    #[tokio::test]
    async fn test_expired_entry_is_miss() {
        let (cache, _store, _dir) = cache(Duration::from_millis(20));
        cache.put("search:k", &json!(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        let value: Option<Value> = cache.get("search:k").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_unserializable_value_is_serialization_error() {
        let (cache, store, _dir) = cache(Duration::from_secs(60));
        let mut by_pair = std::collections::BTreeMap::new();
        by_pair.insert((38u8, 40u8), "case sizes");

        let err = cache.put("search:pairs", &by_pair).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WatchProError>(),
            Some(WatchProError::Serialization(_))
        ));
        assert!(store.get("search:pairs").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_malformed_entry_is_miss() {
        let (cache, store, _dir) = cache(Duration::from_secs(60));
        store.set("search:bad", "{not json", None).await.unwrap();
        let value: Option<Value> = cache.get("search:bad").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_non_positive_ttl() {
        let (cache, store, _dir) = cache(Duration::from_secs(3600));
        cache.put("search:live", &json!(1)).await.unwrap();
        store.set("search:stale", "1", None).await.unwrap();
        store
            .set("search:expired", "1", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        store.set("other:key", "1", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.sweep().await.unwrap(), 1);
        assert!(store.get("search:live").await.unwrap().is_some());
        assert!(store.get("search:stale").await.unwrap().is_none());
        assert!(store.get("other:key").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweeper_runs_and_stops() {
        let (cache, store, _dir) = cache(Duration::from_secs(3600));
        store.set("search:stale", "1", None).await.unwrap();

        let handle = cache.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.get("search:stale").await.unwrap().is_none());
        assert!(!handle.is_finished());
        handle.shutdown();
    }
}
