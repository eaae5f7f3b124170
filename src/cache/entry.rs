use std::time::Duration;
use tokio::time::Instant;

// A single cached record with its expiry windows. Owned by the cache store;
// callers only ever receive clones of `value`, never a reference into here.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: Instant,
    pub fresh_until: Instant,
    pub stale_until: Instant,
}

impl<V> CacheEntry<V> {
    // `stale_ttl` must be >= `ttl`; config validation enforces this before
    // any entry is ever built.
    pub fn new(value: V, now: Instant, ttl: Duration, stale_ttl: Duration) -> Self {
        Self {
            value,
            stored_at: now,
            fresh_until: now + ttl,
            stale_until: now + stale_ttl,
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.fresh_until
    }

    // Past the fresh window but still inside the stale window.
    pub fn is_stale(&self, now: Instant) -> bool {
        now >= self.fresh_until && now < self.stale_until
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn entry_moves_through_fresh_stale_expired() {
        let now = Instant::now();
        let entry = CacheEntry::new(
            42u32,
            now,
            Duration::from_secs(60),
            Duration::from_secs(300),
        );

        assert!(entry.is_fresh(now));
        assert!(entry.is_fresh(now + Duration::from_secs(59)));

        let stale_point = now + Duration::from_secs(60);
        assert!(!entry.is_fresh(stale_point));
        assert!(entry.is_stale(stale_point));
        assert!(entry.is_stale(now + Duration::from_secs(299)));

        // Past the stale window the entry is neither fresh nor stale; the
        // store treats it as absent.
        let expired_point = now + Duration::from_secs(300);
        assert!(!entry.is_fresh(expired_point));
        assert!(!entry.is_stale(expired_point));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_ttl_collapses_the_fresh_window() {
        let now = Instant::now();
        let entry = CacheEntry::new(1u8, now, Duration::ZERO, Duration::from_secs(10));
        assert!(!entry.is_fresh(now));
        assert!(entry.is_stale(now));
    }
}
