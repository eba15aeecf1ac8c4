//! Metrics cache: process-local read-through cache over the monitoring API.
//! Reader/writer lock discipline: the map is probed under a read lock, the upstream fetch
//! happens with no lock held, and the write lock is taken only for the final insert. Entries
//! expire lazily at read time; there is no background sweep and no size bound (keys are
//! added deliberately by humans, not by an unbounded key space).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::bot::log::prefix_component;
use crate::monitor::{MetricsSnapshot, MonitorApi, MonitorError};

/// How long a fetched snapshot stays valid.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

struct CacheEntry {
    snapshot: MetricsSnapshot,
    expires_at: Instant,
}

/// Hit/miss counters for the admin /stats command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct MetricsCache {
    api: Arc<dyn MonitorApi>,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MetricsCache {
    pub fn new(api: Arc<dyn MonitorApi>) -> Self {
        Self::with_ttl(api, DEFAULT_TTL)
    }

    pub fn with_ttl(api: Arc<dyn MonitorApi>, ttl: Duration) -> Self {
        Self {
            api,
            ttl,
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the cached snapshot for this key, fetching from upstream on miss or expiry.
    /// Upstream failures propagate and leave the cache untouched, so the next call retries.
    pub async fn get(&self, server_key: &str) -> Result<MetricsSnapshot, MonitorError> {
        {
            let entries = self.entries.read().expect("metrics cache lock poisoned");
            if let Some(entry) = entries.get(server_key) {
                if Instant::now() < entry.expires_at {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(entry.snapshot.clone());
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let snapshot = match self.api.server_metrics(server_key).await {
            Ok(s) => s,
            Err(e) => {
                eprintln!(
                    "{} op=fetch_metrics server_key={} error={}",
                    prefix_component("cache"),
                    server_key,
                    e
                );
                return Err(e);
            }
        };

        let mut entries = self.entries.write().expect("metrics cache lock poisoned");
        entries.insert(
            server_key.to_string(),
            CacheEntry { snapshot: snapshot.clone(), expires_at: Instant::now() + self.ttl },
        );
        Ok(snapshot)
    }

    /// Drop specific entries, or reset the whole cache when `keys` is empty.
    /// Administrative surface only; normal request flow never calls this.
    pub fn clear(&self, keys: &[String]) {
        let mut entries = self.entries.write().expect("metrics cache lock poisoned");
        if keys.is_empty() {
            entries.clear();
        } else {
            for key in keys {
                entries.remove(key);
            }
        }
    }

    /// Drop one entry (used when a server is removed).
    pub fn evict(&self, server_key: &str) {
        let mut entries = self.entries.write().expect("metrics cache lock poisoned");
        entries.remove(server_key);
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read().expect("metrics cache lock poisoned");
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: entries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    use crate::monitor::{AddedSource, ServerSources};

    struct CountingApi {
        fetches: AtomicUsize,
        fail: std::sync::atomic::AtomicBool,
    }

    impl CountingApi {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                fetches: AtomicUsize::new(0),
                fail: std::sync::atomic::AtomicBool::new(false),
            })
        }

        fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MonitorApi for CountingApi {
        async fn server_sources(&self, _key: &str) -> Result<ServerSources, MonitorError> {
            unimplemented!("not exercised by cache tests")
        }

        async fn add_source(&self, _key: &str, _tag: &str) -> Result<AddedSource, MonitorError> {
            unimplemented!("not exercised by cache tests")
        }

        async fn server_metrics(&self, key: &str) -> Result<MetricsSnapshot, MonitorError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail.load(Ordering::SeqCst) {
                return Err(MonitorError::External("upstream down".to_string()));
            }
            Ok(serde_json::json!({ "key": key, "fetch": n }))
        }
    }

    #[tokio::test]
    async fn second_get_within_ttl_hits_cache() {
        let api = CountingApi::new();
        let cache = MetricsCache::new(api.clone() as Arc<dyn MonitorApi>);

        let first = cache.get("srv_12313").await.unwrap();
        let second = cache.get("srv_12313").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(api.fetch_count(), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn expired_entry_triggers_one_refetch() {
        let api = CountingApi::new();
        let cache = MetricsCache::with_ttl(api.clone() as Arc<dyn MonitorApi>, Duration::ZERO);

        cache.get("srv_12313").await.unwrap();
        cache.get("srv_12313").await.unwrap();
        assert_eq!(api.fetch_count(), 2);
    }

    #[tokio::test]
    async fn failed_fetch_is_not_cached() {
        let api = CountingApi::new();
        let cache = MetricsCache::new(api.clone() as Arc<dyn MonitorApi>);

        api.fail.store(true, Ordering::SeqCst);
        let err = cache.get("srv_12313").await.unwrap_err();
        assert!(matches!(err, MonitorError::External(_)));
        assert_eq!(cache.stats().entries, 0);

        // outage over: the next call goes upstream again and caches
        api.fail.store(false, Ordering::SeqCst);
        cache.get("srv_12313").await.unwrap();
        assert_eq!(api.fetch_count(), 2);
        assert_eq!(cache.stats().entries, 1);
    }

    #[tokio::test]
    async fn clear_drops_named_entries_or_everything() {
        let api = CountingApi::new();
        let cache = MetricsCache::new(api.clone() as Arc<dyn MonitorApi>);

        cache.get("srv_aaaa").await.unwrap();
        cache.get("srv_bbbb").await.unwrap();
        cache.clear(&["srv_aaaa".to_string()]);
        assert_eq!(cache.stats().entries, 1);

        cache.clear(&[]);
        assert_eq!(cache.stats().entries, 0);
    }
}
