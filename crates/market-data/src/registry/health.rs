//! Per-provider health tracking.
//!
//! A provider is either:
//!
//! - **Healthy**: eligible for selection.
//! - **Backoff**: excluded from selection until its backoff window closes.
//!
//! Only exhausting the retry budget on transient failures opens a window.
//! Fatal failures are counted for observability and nothing else. Windows
//! grow with each consecutive exhaustion and reset on the first success.
//!
//! Health is in-memory and resets on restart.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::time::Instant;

use super::backoff::BackoffPolicy;
use crate::models::ProviderId;

/// Selection state of a provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    Healthy,
    Backoff,
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "Healthy"),
            Self::Backoff => write!(f, "Backoff"),
        }
    }
}

#[derive(Debug)]
struct Health {
    state: HealthState,
    backoff_until: Option<Instant>,
    /// Failed calls since the last success, of any class.
    consecutive_failures: u32,
    /// Exhaustions since the last success; drives the cooldown length.
    exhaustion_streak: u32,
    fatal_count: u64,
    last_error: Option<String>,
}

impl Health {
    fn new() -> Self {
        Self {
            state: HealthState::Healthy,
            backoff_until: None,
            consecutive_failures: 0,
            exhaustion_streak: 0,
            fatal_count: 0,
            last_error: None,
        }
    }
}

/// Thread-safe health table keyed by provider id.
pub struct HealthTracker {
    entries: Mutex<HashMap<String, Health>>,
    policy: BackoffPolicy,
}

impl HealthTracker {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            policy,
        }
    }

    /// Lock the health table, recovering from poison if necessary.
    ///
    /// Worst case after recovery is a slightly stale health state, which is
    /// better than panicking on the request path.
    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, Health>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            warn!("Health tracker mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Whether the provider may be selected right now.
    ///
    /// Handles the Backoff -> Healthy transition once the window has closed.
    /// The exhaustion streak survives the transition, so a provider that
    /// fails again right away gets a longer window.
    pub fn is_available(&self, provider: &ProviderId) -> bool {
        let mut entries = self.lock_entries();

        let Some(health) = entries.get_mut(provider.as_ref()) else {
            return true;
        };

        match (health.state, health.backoff_until) {
            (HealthState::Healthy, _) => true,
            (HealthState::Backoff, Some(until)) if Instant::now() < until => false,
            (HealthState::Backoff, _) => {
                info!("Provider '{}' backoff window closed, eligible again", provider);
                health.state = HealthState::Healthy;
                health.backoff_until = None;
                true
            }
        }
    }

    /// Record a successful call. Clears backoff and every failure counter.
    pub fn record_success(&self, provider: &ProviderId) {
        let mut entries = self.lock_entries();
        let health = entries
            .entry(provider.to_string())
            .or_insert_with(Health::new);

        if health.state == HealthState::Backoff {
            info!("Provider '{}' recovered, leaving backoff", provider);
        } else if health.consecutive_failures > 0 {
            debug!(
                "Provider '{}' succeeded after {} failures",
                provider, health.consecutive_failures
            );
        }

        health.state = HealthState::Healthy;
        health.backoff_until = None;
        health.consecutive_failures = 0;
        health.exhaustion_streak = 0;
    }

    /// Record one failed attempt that will be retried.
    pub fn record_transient(&self, provider: &ProviderId, error: &str) {
        let mut entries = self.lock_entries();
        let health = entries
            .entry(provider.to_string())
            .or_insert_with(Health::new);

        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.last_error = Some(error.to_string());
    }

    /// Record that the retry budget ran out and open a backoff window.
    ///
    /// Returns the length of the window.
    pub fn record_exhausted(&self, provider: &ProviderId, error: &str) -> Duration {
        let mut entries = self.lock_entries();
        let health = entries
            .entry(provider.to_string())
            .or_insert_with(Health::new);

        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.exhaustion_streak = health.exhaustion_streak.saturating_add(1);
        health.last_error = Some(error.to_string());

        let cooldown = self.policy.cooldown_for(health.exhaustion_streak);
        health.state = HealthState::Backoff;
        health.backoff_until = Some(Instant::now() + cooldown);

        info!(
            "Provider '{}' entering backoff for {:?} ({} consecutive failures)",
            provider, cooldown, health.consecutive_failures
        );
        cooldown
    }

    /// Record a fatal failure. Never opens a backoff window.
    pub fn record_fatal(&self, provider: &ProviderId, error: &str) {
        let mut entries = self.lock_entries();
        let health = entries
            .entry(provider.to_string())
            .or_insert_with(Health::new);

        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        health.fatal_count = health.fatal_count.saturating_add(1);
        health.last_error = Some(error.to_string());

        debug!("Provider '{}' fatal failure recorded: {}", provider, error);
    }

    pub fn state(&self, provider: &ProviderId) -> HealthState {
        let entries = self.lock_entries();
        entries
            .get(provider.as_ref())
            .map(|h| h.state)
            .unwrap_or(HealthState::Healthy)
    }

    pub fn consecutive_failures(&self, provider: &ProviderId) -> u32 {
        let entries = self.lock_entries();
        entries
            .get(provider.as_ref())
            .map(|h| h.consecutive_failures)
            .unwrap_or(0)
    }

    /// Snapshot of every provider seen so far.
    pub fn snapshot(&self) -> Vec<HealthSnapshot> {
        let entries = self.lock_entries();
        let now = Instant::now();

        let mut snapshots: Vec<HealthSnapshot> = entries
            .iter()
            .map(|(provider, health)| HealthSnapshot {
                provider: provider.clone(),
                state: health.state,
                backoff_remaining: health
                    .backoff_until
                    .map(|until| until.saturating_duration_since(now))
                    .filter(|remaining| !remaining.is_zero()),
                consecutive_failures: health.consecutive_failures,
                fatal_count: health.fatal_count,
                last_error: health.last_error.clone(),
            })
            .collect();
        snapshots.sort_by(|a, b| a.provider.cmp(&b.provider));
        snapshots
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(BackoffPolicy::default())
    }
}

/// Point-in-time view of one provider's health.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    pub provider: String,
    pub state: HealthState,
    /// Time left in the backoff window, if one is open.
    pub backoff_remaining: Option<Duration>,
    pub consecutive_failures: u32,
    pub fatal_count: u64,
    pub last_error: Option<String>,
}

impl HealthSnapshot {
    /// Snapshot for a provider with no recorded history.
    pub fn healthy(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            state: HealthState::Healthy,
            backoff_remaining: None,
            consecutive_failures: 0,
            fatal_count: 0,
            last_error: None,
        }
    }
}
