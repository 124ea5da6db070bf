//! Per-host request pacing for market data providers.
//!
//! Enforces a minimum interval between consecutive calls to the same
//! upstream host. Callers that arrive too early are suspended until their
//! slot opens; this is the only intentional sleep around outbound calls.
//! Concurrent callers for one host each reserve a distinct slot, so they
//! leave the limiter spaced at least `min_interval` apart.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};
use tokio::time::Instant;

use crate::models::HostId;

/// Per-host pacing state.
#[derive(Debug)]
struct HostSlot {
    /// When the most recent call to this host was (or is scheduled to be) issued.
    last_call: Instant,
}

/// Thread-safe per-host pacer.
///
/// Hosts are tracked on first use. The interval is supplied per call since
/// it is a property of the provider talking to the host.
pub struct RateLimiter {
    slots: Mutex<HashMap<String, HostSlot>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Lock the slots mutex, recovering from poison if necessary.
    ///
    /// The worst case after recovery is a slightly early request, which is
    /// better than panicking.
    fn lock_slots(&self) -> MutexGuard<'_, HashMap<String, HostSlot>> {
        self.slots.lock().unwrap_or_else(|poisoned| {
            warn!("Rate limiter mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Reserve the next slot for `host` and return how long the caller must wait.
    ///
    /// `wait = min_interval - (now - last_call)`, clamped at zero. The
    /// reservation is recorded before returning, so a second caller sees the
    /// first caller's slot as the latest call.
    pub fn reserve(&self, host: &HostId, min_interval: Duration) -> Duration {
        let now = Instant::now();
        let mut slots = self.lock_slots();

        match slots.get_mut(host.as_ref()) {
            Some(slot) => {
                let earliest = slot.last_call + min_interval;
                let scheduled = if earliest > now { earliest } else { now };
                slot.last_call = scheduled;
                scheduled.saturating_duration_since(now)
            }
            None => {
                slots.insert(host.to_string(), HostSlot { last_call: now });
                Duration::ZERO
            }
        }
    }

    /// Wait until a call to `host` is allowed.
    pub async fn acquire(&self, host: &HostId, min_interval: Duration) {
        let wait = self.reserve(host, min_interval);

        if wait > Duration::ZERO {
            debug!("Rate limiter: waiting {:?} for host '{}'", wait, host);
            tokio::time::sleep(wait).await;
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_call_is_immediate() {
        let limiter = RateLimiter::new();
        let host: HostId = Cow::Borrowed("finnhub.io");

        assert_eq!(limiter.reserve(&host, Duration::from_secs(1)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_waits_remaining_interval() {
        let limiter = RateLimiter::new();
        let host: HostId = Cow::Borrowed("finnhub.io");

        limiter.reserve(&host, Duration::from_secs(12));
        tokio::time::advance(Duration::from_secs(5)).await;

        assert_eq!(
            limiter.reserve(&host, Duration::from_secs(12)),
            Duration::from_secs(7)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_elapsed() {
        let limiter = RateLimiter::new();
        let host: HostId = Cow::Borrowed("finnhub.io");

        limiter.reserve(&host, Duration::from_secs(1));
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(limiter.reserve(&host, Duration::from_secs(1)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hosts_are_isolated() {
        let limiter = RateLimiter::new();
        let a: HostId = Cow::Borrowed("api.polygon.io");
        let b: HostId = Cow::Borrowed("serpapi.com");

        limiter.reserve(&a, Duration::from_secs(10));
        assert_eq!(limiter.reserve(&b, Duration::from_secs(10)), Duration::ZERO);
        assert!(limiter.reserve(&a, Duration::from_secs(10)) > Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_are_spaced() {
        let limiter = Arc::new(RateLimiter::new());
        let host: HostId = Cow::Borrowed("finnhub.io");
        let interval = Duration::from_secs(1);
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = limiter.clone();
            let host = host.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(&host, interval).await;
                Instant::now()
            }));
        }

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap().duration_since(start));
        }
        finished.sort();

        assert_eq!(finished[0], Duration::ZERO);
        assert_eq!(finished[1], Duration::from_secs(1));
        assert_eq!(finished[2], Duration::from_secs(2));
    }
}
