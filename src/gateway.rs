use futures::future::BoxFuture;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::breaker::CircuitBreaker;
use crate::cache::store::TtlCache;
use crate::config::{ConfigError, GatewayConfig};
use crate::rate_limiter::TokenBucket;
use crate::single_flight::SingleFlightGroup;

// Errors surfaced by `FetchGateway::get`. Clone + PartialEq so the
// single-flight group can hand the identical failure to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("record not found upstream: {0}")]
    NotFound(String),
    #[error("upstream request failed: {0}")]
    Upstream(String),
    #[error("upstream circuit open")]
    CircuitOpen,
    #[error("refresh task aborted before publishing a result")]
    RefreshAborted,
}

// The one upstream capability the gateway consumes: fetch a record by key.
// Supplied by the surrounding adapter layer that knows how to call the
// upstream API and translate its response.
pub type FetchFn<K, V> =
    Arc<dyn Fn(K) -> BoxFuture<'static, Result<V, GatewayError>> + Send + Sync>;

// How a returned value was obtained. Stale-served responses carry the same
// data as fresh ones; this marker is the bookkeeping that tells them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeSource {
    // Returned straight from the fresh cache window, no upstream call.
    Fresh,
    // Fetched from the upstream during this call (or a shared in-flight one).
    Refreshed,
    // Upstream failed; an expired-but-retained value was served instead.
    Stale,
}

#[derive(Debug, Clone)]
pub struct Served<V> {
    pub value: V,
    pub source: ServeSource,
}

// Rate-limited caching access layer between callers and a slow upstream.
//
// `get` serves from the fresh cache window when it can; otherwise it
// refreshes through the single-flight group so concurrent misses for the
// same key cost one upstream call, gated by the token bucket and the
// circuit breaker, falling back to a retained stale value when the
// upstream fails.
#[derive(Clone)]
pub struct FetchGateway<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache: Arc<TtlCache<K, V>>,
    limiter: Arc<TokenBucket>,
    breaker: Arc<CircuitBreaker>,
    flights: Arc<SingleFlightGroup<K, Result<Served<V>, GatewayError>>>,
    fetch: FetchFn<K, V>,
    stale_serving_enabled: bool,
    metrics: Arc<RwLock<GatewayMetrics>>,
}

impl<K, V> FetchGateway<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // Validates the configuration and wires the cache, rate limiter and
    // breaker together. Bad parameters fail here, never at call time.
    pub fn new(config: GatewayConfig, fetch: FetchFn<K, V>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            cache: Arc::new(TtlCache::new(
                config.ttl(),
                config.effective_stale_ttl(),
                config.cache_capacity,
            )),
            limiter: Arc::new(TokenBucket::new(config.rate, config.burst_size)),
            breaker: Arc::new(CircuitBreaker::new(
                config.failure_threshold,
                config.reset_timeout(),
            )),
            flights: Arc::new(SingleFlightGroup::new()),
            fetch,
            stale_serving_enabled: config.stale_serving_enabled,
            metrics: Arc::new(RwLock::new(GatewayMetrics::new())),
        })
    }

    pub async fn get(&self, key: K) -> Result<V, GatewayError> {
        self.get_with_source(key).await.map(|served| served.value)
    }

    // Like `get`, but also reports whether the value came from the fresh
    // window, a refresh, or the stale fallback.
    pub async fn get_with_source(&self, key: K) -> Result<Served<V>, GatewayError> {
        if let Some((value, false)) = self.cache.get(&key).await {
            debug!("serving fresh cached value");
            self.metrics.write().await.record_fresh_hit();
            return Ok(Served {
                value,
                source: ServeSource::Fresh,
            });
        }

        // Miss or stale: refresh through the single-flight group so every
        // concurrent caller for this key shares one upstream call and one
        // rate-limit token.
        let refresh = Self::refresh(
            Arc::clone(&self.cache),
            Arc::clone(&self.limiter),
            Arc::clone(&self.breaker),
            Arc::clone(&self.fetch),
            Arc::clone(&self.metrics),
            self.stale_serving_enabled,
            key.clone(),
        );
        match self.flights.run(key, refresh).await {
            Some(result) => result,
            None => Err(GatewayError::RefreshAborted),
        }
    }

    // Invalidate one entry, or all entries when `key` is `None`. Called by
    // the surrounding webhook/event collaborator when upstream data changed.
    // A refresh already in flight is unaffected and will still store its
    // result once it completes; the next `get` after that refresh observes
    // whichever of the two happened last.
    pub async fn invalidate(&self, key: Option<&K>) {
        match key {
            Some(key) => self.cache.invalidate(key).await,
            None => self.cache.invalidate_all().await,
        }
    }

    pub async fn metrics_report(&self) -> String {
        self.metrics.read().await.report()
    }

    pub async fn stale_served_count(&self) -> usize {
        self.metrics.read().await.stale_served
    }

    pub async fn refresh_count(&self) -> usize {
        self.metrics.read().await.refreshes
    }

    pub async fn fresh_hit_count(&self) -> usize {
        self.metrics.read().await.fresh_hits
    }

    // The actual refresh, run on a detached task by the single-flight
    // group. Breaker guard first (an open circuit must not consume a
    // token), then the rate-limit wait, then the upstream call.
    async fn refresh(
        cache: Arc<TtlCache<K, V>>,
        limiter: Arc<TokenBucket>,
        breaker: Arc<CircuitBreaker>,
        fetch: FetchFn<K, V>,
        metrics: Arc<RwLock<GatewayMetrics>>,
        stale_serving_enabled: bool,
        key: K,
    ) -> Result<Served<V>, GatewayError> {
        if breaker.is_open().await {
            warn!("circuit open, skipping upstream call");
            return Self::stale_or(
                cache,
                metrics,
                stale_serving_enabled,
                &key,
                GatewayError::CircuitOpen,
            )
            .await;
        }

        limiter.acquire().await;

        match (fetch)(key.clone()).await {
            Ok(value) => {
                breaker.record_success().await;
                cache.put(key, value.clone()).await;
                metrics.write().await.record_refresh();
                Ok(Served {
                    value,
                    source: ServeSource::Refreshed,
                })
            }
            Err(err) => {
                warn!("upstream fetch failed: {}", err);
                breaker.record_failure().await;
                metrics.write().await.record_upstream_failure();
                Self::stale_or(cache, metrics, stale_serving_enabled, &key, err).await
            }
        }
    }

    // Failure path: serve the retained value if one exists and stale
    // serving is enabled. The entry is returned as-is; its expiry is not
    // reset and nothing is re-stored.
    async fn stale_or(
        cache: Arc<TtlCache<K, V>>,
        metrics: Arc<RwLock<GatewayMetrics>>,
        stale_serving_enabled: bool,
        key: &K,
        err: GatewayError,
    ) -> Result<Served<V>, GatewayError> {
        if stale_serving_enabled {
            if let Some((value, _)) = cache.get(key).await {
                warn!("serving stale value after upstream failure");
                metrics.write().await.record_stale_served();
                return Ok(Served {
                    value,
                    source: ServeSource::Stale,
                });
            }
        }
        Err(err)
    }
}

// Counters distinguishing how the gateway answered its callers.
pub struct GatewayMetrics {
    fresh_hits: usize,
    refreshes: usize,
    stale_served: usize,
    upstream_failures: usize,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            fresh_hits: 0,
            refreshes: 0,
            stale_served: 0,
            upstream_failures: 0,
        }
    }

    pub fn record_fresh_hit(&mut self) {
        self.fresh_hits += 1;
    }

    pub fn record_refresh(&mut self) {
        self.refreshes += 1;
    }

    pub fn record_stale_served(&mut self) {
        self.stale_served += 1;
    }

    pub fn record_upstream_failure(&mut self) {
        self.upstream_failures += 1;
    }

    pub fn report(&self) -> String {
        format!(
            "Fresh hits: {}, Refreshes: {}, Stale served: {}, Upstream failures: {}",
            self.fresh_hits, self.refreshes, self.stale_served, self.upstream_failures
        )
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
