use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

// Circuit breaker guarding the upstream fetch path.
//
// Opens after `failure_threshold` consecutive failures; while open, refresh
// attempts fail immediately without consuming a rate-limit token or touching
// the upstream. Once `reset_timeout` has elapsed the breaker closes again
// and the failure count starts over.
pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<BreakerState>,
}

struct BreakerState {
    failure_count: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            reset_timeout,
            state: Mutex::new(BreakerState {
                failure_count: 0,
                opened_at: None,
            }),
        }
    }

    pub async fn is_open(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.opened_at {
            None => false,
            Some(opened_at) => {
                if opened_at.elapsed() >= self.reset_timeout {
                    debug!("circuit breaker reset timeout elapsed, closing");
                    state.opened_at = None;
                    state.failure_count = 0;
                    false
                } else {
                    true
                }
            }
        }
    }

    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        state.failure_count = 0;
        state.opened_at = None;
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        state.failure_count += 1;
        if state.failure_count >= self.failure_threshold && state.opened_at.is_none() {
            warn!(
                failures = state.failure_count,
                "failure threshold reached, opening circuit"
            );
            state.opened_at = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::advance;

    #[tokio::test(start_paused = true)]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));

        breaker.record_failure().await;
        breaker.record_failure().await;
        assert!(!breaker.is_open().await);

        breaker.record_failure().await;
        assert!(breaker.is_open().await);
    }

    #[tokio::test(start_paused = true)]
    async fn closes_after_reset_timeout() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(30));

        breaker.record_failure().await;
        assert!(breaker.is_open().await);

        advance(Duration::from_secs(30)).await;
        assert!(!breaker.is_open().await);

        // The count restarted; one more failure reopens it.
        breaker.record_failure().await;
        assert!(breaker.is_open().await);
    }

    #[tokio::test(start_paused = true)]
    async fn success_clears_accumulated_failures() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(30));

        breaker.record_failure().await;
        breaker.record_success().await;
        breaker.record_failure().await;
        assert!(!breaker.is_open().await);
    }
}
