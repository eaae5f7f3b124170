use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

// Token bucket rate limiter gating calls to the upstream API.
//
// Tokens accrue continuously at `rate` per second, capped at `burst_size`.
// The check-and-decrement is a short critical section; an `acquire` that
// finds the bucket empty computes the replenish time, sleeps with the lock
// released, and retries. No fairness guarantee beyond every acquire
// eventually succeeding.
pub struct TokenBucket {
    rate: f64,
    burst_size: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    // `rate` must be > 0 and `burst_size` >= 1; config validation rejects
    // anything else before a bucket is built.
    pub fn new(rate: f64, burst_size: u32) -> Self {
        Self {
            rate,
            burst_size: f64::from(burst_size),
            state: Mutex::new(BucketState {
                tokens: f64::from(burst_size),
                last_refill: Instant::now(),
            }),
        }
    }

    // Waits until at least one token is available, then consumes it.
    // Always eventually succeeds.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }

                let needed = 1.0 - state.tokens;
                Duration::from_secs_f64(needed / self.rate)
            };

            debug!("rate limit reached, waiting {:?} for replenish", wait);
            sleep(wait).await;
        }
    }

    // Consumes a token only if one is available right now.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst_size);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn burst_is_consumed_without_waiting() {
        let bucket = TokenBucket::new(2.0, 5);
        let start = Instant::now();

        for _ in 0..5 {
            bucket.acquire().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn acquires_past_burst_pace_at_the_configured_rate() {
        let bucket = TokenBucket::new(2.0, 4);
        let start = Instant::now();

        // 10 acquires with a burst of 4 at 2/s: at least (10-4)/2 = 3s.
        for _ in 0..10 {
            bucket.acquire().await;
        }

        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_replenish_but_cap_at_burst() {
        let bucket = TokenBucket::new(1.0, 2);
        assert!(bucket.try_acquire().await);
        assert!(bucket.try_acquire().await);
        assert!(!bucket.try_acquire().await);

        // Far longer than needed to refill two tokens; the cap holds.
        advance(Duration::from_secs(60)).await;
        assert!(bucket.try_acquire().await);
        assert!(bucket.try_acquire().await);
        assert!(!bucket.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn try_acquire_never_waits() {
        let bucket = TokenBucket::new(0.5, 1);
        assert!(bucket.try_acquire().await);

        let start = Instant::now();
        assert!(!bucket.try_acquire().await);
        assert_eq!(start.elapsed(), Duration::ZERO);

        advance(Duration::from_secs(2)).await;
        assert!(bucket.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquires_all_succeed() {
        use std::sync::Arc;

        let bucket = Arc::new(TokenBucket::new(10.0, 2));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let bucket = Arc::clone(&bucket);
            handles.push(tokio::spawn(async move { bucket.acquire().await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
