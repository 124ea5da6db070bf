//! Background task that evicts expired cache entries.
//!
//! Runs on its own tokio task with its own cancellation token, independent
//! of request handling. Request paths never wait on it.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::Sweep;

/// Owns a running sweeper. Dropping the handle cancels the task.
pub struct SweeperHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Token that stops the sweeper when cancelled.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Cancel the sweeper and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Start sweeping `targets` every `period`.
///
/// The first sweep happens one full period after start.
pub fn spawn_sweeper(targets: Vec<Arc<dyn Sweep>>, period: Duration) -> SweeperHandle {
    let token = CancellationToken::new();
    let cancel = token.clone();

    let task = tokio::spawn(async move {
        info!("Cache sweeper started ({:?} interval)", period);

        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let removed: usize = targets.iter().map(|t| t.sweep()).sum();
                    debug!("Cache sweeper evicted {} entries", removed);
                }
            }
        }

        info!("Cache sweeper stopped");
    });

    SweeperHandle {
        token,
        task: Some(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlCache;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_on_schedule() {
        let cache: Arc<TtlCache<&'static str, u32>> = Arc::new(TtlCache::new());
        cache.put("AAPL", 1, Duration::from_secs(5));

        let handle = spawn_sweeper(vec![cache.clone() as Arc<dyn Sweep>], Duration::from_secs(10));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(cache.is_empty());
        assert!(handle.is_running());

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_sweeper_stops() {
        let cache: Arc<TtlCache<&'static str, u32>> = Arc::new(TtlCache::new());
        let handle = spawn_sweeper(vec![cache.clone() as Arc<dyn Sweep>], Duration::from_secs(10));
        let token = handle.token();

        token.cancel();
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!handle.is_running());

        // Entries are left alone once the sweeper is gone
        cache.put("AAPL", 1, Duration::from_secs(1));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(cache.len(), 1);
    }
}
