use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::debug;

// Collapses concurrent calls for the same key into a single execution.
//
// The first caller for a key becomes the leader: its work runs on a
// detached task so that a caller abandoning its wait never cancels the
// shared call. Later callers for the same key become waiters on the same
// result channel. The in-flight record is removed before the result is
// published, so the next call for that key starts a fresh execution;
// memoization is the cache's job, not this group's.
pub struct SingleFlightGroup<K, T> {
    inflight: Arc<Mutex<HashMap<K, watch::Receiver<Option<T>>>>>,
}

impl<K, T> SingleFlightGroup<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    // Runs `fut` unless a call for `key` is already in flight, in which
    // case the caller waits for that call's result instead. Every caller
    // receives the one shared outcome. Returns `None` only if the flight
    // task died without publishing a result (runtime shutdown).
    pub async fn run<F>(&self, key: K, fut: F) -> Option<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let mut rx = {
            let mut inflight = self.inflight.lock().await;
            if let Some(rx) = inflight.get(&key) {
                debug!("joining call already in flight");
                rx.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                inflight.insert(key.clone(), rx.clone());

                let map = Arc::clone(&self.inflight);
                tokio::spawn(async move {
                    let result = fut.await;
                    // Remove before publishing so the next call for this
                    // key starts fresh.
                    map.lock().await.remove(&key);
                    let _ = tx.send(Some(result));
                });
                rx
            }
        };

        loop {
            if let Some(result) = rx.borrow_and_update().clone() {
                return Some(result);
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }

    pub async fn inflight_count(&self) -> usize {
        self.inflight.lock().await.len()
    }
}

impl<K, T> Default for SingleFlightGroup<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
