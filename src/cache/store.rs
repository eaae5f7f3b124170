use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::entry::CacheEntry;

// Represents a thread-safe TTL cache with a fresh window and an extended
// stale window per entry, protected by a read-write lock.
//
// Entries past their stale window are treated as absent and purged lazily
// when touched. A bounded capacity evicts the least-recently-stored entry
// once the cache is full.
pub struct TtlCache<K, V>
where
    K: Eq + Hash + Clone + 'static + Send + Sync,
{
    // Map and store-order queue live under one lock so a `put` during a
    // concurrent `get` can never yield a torn read.
    inner: RwLock<StoreInner<K, V>>,

    // Metrics tracking cache hits, misses, and evictions.
    metrics: Arc<RwLock<CacheMetrics>>,

    ttl: Duration,
    stale_ttl: Duration,
    capacity: usize,
}

struct StoreInner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    // Keys in store order, least-recently-stored at the front.
    store_order: VecDeque<K>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + 'static + Send + Sync,
    V: Clone + 'static + Send + Sync,
{
    // `stale_ttl` is the full retention window measured from the store
    // time; when stale serving is disabled pass `stale_ttl == ttl` so the
    // stale window collapses to zero width.
    pub fn new(ttl: Duration, stale_ttl: Duration, capacity: usize) -> Self {
        debug_assert!(stale_ttl >= ttl);
        Self {
            inner: RwLock::new(StoreInner {
                entries: HashMap::new(),
                store_order: VecDeque::new(),
            }),
            metrics: Arc::new(RwLock::new(CacheMetrics::new())),
            ttl,
            stale_ttl,
            capacity,
        }
    }

    // Retrieves a value if the entry is inside its retention window.
    // Returns `(value, is_stale)`: stale means past the fresh window but
    // still inside the stale window. Expired entries are purged and
    // reported as absent.
    pub async fn get(&self, key: &K) -> Option<(V, bool)> {
        let now = Instant::now();
        let mut inner = self.inner.write().await;

        let lookup = inner.entries.get(key).map(|entry| {
            if entry.is_fresh(now) {
                Some((entry.value.clone(), false))
            } else if entry.is_stale(now) {
                Some((entry.value.clone(), true))
            } else {
                // Past the stale window, as good as absent.
                None
            }
        });

        match lookup {
            Some(Some((value, stale))) => {
                self.metrics.write().await.record_hit();
                Some((value, stale))
            }
            Some(None) => {
                inner.entries.remove(key);
                inner.store_order.retain(|k| k != key);
                self.metrics.write().await.record_miss();
                None
            }
            None => {
                self.metrics.write().await.record_miss();
                None
            }
        }
    }

    // Adds or overwrites a value, stamping its fresh and stale windows from
    // the current time. Overwriting renews the key's store order; inserting
    // past capacity evicts the least-recently-stored entry.
    pub async fn put(&self, key: K, value: V) {
        let now = Instant::now();
        let mut inner = self.inner.write().await;

        if inner.entries.contains_key(&key) {
            inner.store_order.retain(|k| k != &key);
        } else if inner.entries.len() >= self.capacity {
            if let Some(evicted) = inner.store_order.pop_front() {
                inner.entries.remove(&evicted);
                self.metrics.write().await.record_eviction();
                debug!("evicted least-recently-stored entry to make room");
            }
        }

        let entry = CacheEntry::new(value, now, self.ttl, self.stale_ttl);
        inner.store_order.push_back(key.clone());
        inner.entries.insert(key, entry);
    }

    // Removes the entry for `key` if present; no-op otherwise.
    pub async fn invalidate(&self, key: &K) {
        let mut inner = self.inner.write().await;
        if inner.entries.remove(key).is_some() {
            inner.store_order.retain(|k| k != key);
            debug!("invalidated cache entry");
        }
    }

    // Clears every entry.
    pub async fn invalidate_all(&self) {
        let mut inner = self.inner.write().await;
        let count = inner.entries.len();
        inner.entries.clear();
        inner.store_order.clear();
        debug!("invalidated all {} cache entries", count);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    // Retrieves a string report of current cache metrics.
    // Example: "Hits: 10, Misses: 3, Evictions: 5".
    pub async fn report_metrics(&self) -> String {
        self.metrics.read().await.report()
    }

    pub async fn eviction_count(&self) -> usize {
        self.metrics.read().await.evictions
    }
}

// Represents metrics tracking for cache operations.
pub struct CacheMetrics {
    hits: usize,
    misses: usize,
    evictions: usize,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self {
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn report(&self) -> String {
        format!(
            "Hits: {}, Misses: {}, Evictions: {}",
            self.hits, self.misses, self.evictions
        )
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}
