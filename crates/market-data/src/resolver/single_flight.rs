//! Per-key deduplication of in-flight work.
//!
//! The first caller for a key spawns the work on its own task; every caller
//! arriving while it runs gets a clone of the same shared future, so all of
//! them observe the exact same output. The entry is removed as soon as the
//! task finishes, including when it panics.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, error, warn};

/// Future every caller for one key awaits.
pub type SharedFlight<V> = Shared<BoxFuture<'static, V>>;

struct Flight<V> {
    /// Distinguishes a detached flight from its replacement.
    id: u64,
    future: SharedFlight<V>,
}

pub struct SingleFlight<K, V> {
    flights: Mutex<HashMap<K, Flight<V>>>,
    next_id: AtomicU64,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn lock_flights(&self) -> MutexGuard<'_, HashMap<K, Flight<V>>> {
        self.flights.lock().unwrap_or_else(|poisoned| {
            warn!("Single-flight mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Join the flight for `key`, or start `work` as a new one.
    ///
    /// `on_panic` produces the output handed to every waiter if the task
    /// running `work` panics or is cancelled.
    pub fn run<W, P>(self: &Arc<Self>, key: K, work: W, on_panic: P) -> SharedFlight<V>
    where
        W: Future<Output = V> + Send + 'static,
        P: FnOnce() -> V + Send + 'static,
    {
        let mut flights = self.lock_flights();

        if let Some(flight) = flights.get(&key) {
            debug!("Joining in-flight resolution for {}", key);
            return flight.future.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = FlightGuard {
            table: Arc::clone(self),
            key: key.clone(),
            id,
        };

        let task = tokio::spawn(async move {
            let _guard = guard;
            work.await
        });

        let flight_key = key.clone();
        let future = async move {
            match task.await {
                Ok(output) => output,
                Err(e) => {
                    error!("In-flight resolution for {} failed: {}", flight_key, e);
                    on_panic()
                }
            }
        }
        .boxed()
        .shared();

        flights.insert(
            key,
            Flight {
                id,
                future: future.clone(),
            },
        );
        future
    }

    /// Stop routing new callers to the current flight for `key`.
    ///
    /// The running work is left alone and its waiters still get its output.
    /// Returns true if a flight was detached.
    pub fn detach(&self, key: &K) -> bool {
        self.lock_flights().remove(key).is_some()
    }

    /// Number of flights currently running.
    pub fn len(&self) -> usize {
        self.lock_flights().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_flights().is_empty()
    }

    fn finish(&self, key: &K, id: u64) {
        let mut flights = self.lock_flights();
        if flights.get(key).map(|f| f.id == id).unwrap_or(false) {
            flights.remove(key);
        }
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Removes its flight from the table when the task ends, however it ends.
struct FlightGuard<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    table: Arc<SingleFlight<K, V>>,
    key: K,
    id: u64,
}

impl<K, V> Drop for FlightGuard<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.table.finish(&self.key, self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn table() -> Arc<SingleFlight<String, u32>> {
        Arc::new(SingleFlight::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_run() {
        let flights = table();
        let runs = Arc::new(AtomicUsize::new(0));

        let futures: Vec<_> = (0..10)
            .map(|_| {
                let runs = runs.clone();
                flights.run(
                    "AAPL".to_string(),
                    async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        7
                    },
                    || 0,
                )
            })
            .collect();

        let outputs = futures::future::join_all(futures).await;

        assert!(outputs.iter().all(|&v| v == 7));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_removed_after_completion() {
        let flights = table();

        let output = flights.run("AAPL".to_string(), async { 1 }, || 0).await;
        assert_eq!(output, 1);
        assert!(flights.is_empty());

        // A later call starts a fresh run
        let output = flights.run("AAPL".to_string(), async { 2 }, || 0).await;
        assert_eq!(output, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_work_yields_fallback() {
        let flights = table();

        let output = flights
            .run(
                "AAPL".to_string(),
                async {
                    if true {
                        panic!("provider exploded");
                    }
                    1
                },
                || 99,
            )
            .await;

        assert_eq!(output, 99);
        assert!(flights.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_flight_does_not_remove_successor() {
        let flights = table();

        let first = flights.run(
            "AAPL".to_string(),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                1
            },
            || 0,
        );
        tokio::task::yield_now().await;

        assert!(flights.detach(&"AAPL".to_string()));
        let second = flights.run(
            "AAPL".to_string(),
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                2
            },
            || 0,
        );

        assert_eq!(first.await, 1);
        assert_eq!(flights.len(), 1);
        assert_eq!(second.await, 2);
        assert!(flights.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_run_independently() {
        let flights = table();

        let a = flights.run("AAPL".to_string(), async { 1 }, || 0);
        let b = flights.run("MSFT".to_string(), async { 2 }, || 0);

        assert_eq!(flights.len(), 2);
        assert_eq!(a.await + b.await, 3);
    }
}
