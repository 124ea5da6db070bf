//! Bookkeeping that outlives individual walks.
//!
//! Two tables live here:
//!
//! - the last real payload seen per key, used to seed synthesis
//! - the invalidation record per key, which tells a finishing walk whether
//!   an `invalidate` happened after it started, and tells new walks to skip
//!   the store until a post-invalidation result has been persisted
//!
//! Both are pruned by the background sweeper.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use log::debug;
use tokio::time::Instant;

use crate::cache::Sweep;
use crate::config::{ResolverConfig, StorePolicy};
use crate::models::{MarketData, RequestKey, RequestKind};

/// Invalidation epoch observed when a walk started.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Ticket(u64);

#[derive(Clone, Debug)]
struct Known {
    data: MarketData,
    seen_at: Instant,
}

#[derive(Clone, Copy, Debug)]
struct Invalidation {
    epoch: u64,
    at: Instant,
    /// A walk started after the invalidation has persisted its result.
    settled: bool,
}

pub(crate) struct Session {
    known: DashMap<RequestKey, Known>,
    invalidations: DashMap<RequestKey, Invalidation>,
    epoch: AtomicU64,
    known_retention: Duration,
    /// Longest time a walk can still be writing after it started.
    walk_horizon: Duration,
    store_policy: StorePolicy,
}

impl Session {
    pub fn new(config: &ResolverConfig) -> Self {
        Self {
            known: DashMap::new(),
            invalidations: DashMap::new(),
            epoch: AtomicU64::new(0),
            known_retention: config.last_known_retention(),
            walk_horizon: config.deadline() * 2,
            store_policy: config.store.clone(),
        }
    }

    pub fn ticket(&self) -> Ticket {
        Ticket(self.epoch.load(Ordering::SeqCst))
    }

    /// Record an invalidation of `key`. Every walk holding an older ticket
    /// is superseded from here on.
    pub fn invalidate(&self, key: &RequestKey) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.invalidations.insert(
            key.clone(),
            Invalidation {
                epoch,
                at: Instant::now(),
                settled: false,
            },
        );
    }

    /// True when `key` was invalidated after the walk holding `ticket` started.
    pub fn is_superseded(&self, key: &RequestKey, ticket: Ticket) -> bool {
        self.invalidations
            .get(key)
            .map(|inv| inv.epoch > ticket.0)
            .unwrap_or(false)
    }

    /// True while the store may still hold a record written before the
    /// latest invalidation of `key`.
    pub fn skips_store(&self, key: &RequestKey) -> bool {
        self.invalidations
            .get(key)
            .map(|inv| !inv.settled)
            .unwrap_or(false)
    }

    /// A walk holding `ticket` persisted its result for `key`.
    pub fn settle(&self, key: &RequestKey, ticket: Ticket) {
        if let Some(mut inv) = self.invalidations.get_mut(key) {
            if inv.epoch <= ticket.0 {
                inv.settled = true;
            }
        }
    }

    /// Keep `data` as the synthesis seed for `key`. News is never a seed.
    pub fn remember(&self, key: &RequestKey, data: &MarketData) {
        if matches!(key.kind, RequestKind::News(_)) {
            return;
        }
        self.known.insert(
            key.clone(),
            Known {
                data: data.clone(),
                seen_at: Instant::now(),
            },
        );
    }

    /// Like [`remember`](Self::remember), without replacing a newer payload.
    pub fn remember_if_absent(&self, key: &RequestKey, data: MarketData) {
        if matches!(key.kind, RequestKind::News(_)) {
            return;
        }
        self.known.entry(key.clone()).or_insert_with(|| Known {
            data,
            seen_at: Instant::now(),
        });
    }

    pub fn seed(&self, key: &RequestKey) -> Option<MarketData> {
        self.known.get(key).map(|known| known.data.clone())
    }

    pub fn known_len(&self) -> usize {
        self.known.len()
    }

    #[cfg(test)]
    fn invalidations_len(&self) -> usize {
        self.invalidations.len()
    }

    /// How long an invalidation record must survive.
    ///
    /// At least until every walk that started before it has finished. An
    /// unsettled record also stays until any record the store held before
    /// the invalidation is too old to be served anyway.
    fn invalidation_retention(&self, key: &RequestKey, inv: &Invalidation) -> Duration {
        if inv.settled {
            return self.walk_horizon;
        }
        let store_age = self
            .store_policy
            .max_age(&key.kind)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.walk_horizon.max(store_age)
    }
}

impl Sweep for Session {
    fn sweep(&self) -> usize {
        let now = Instant::now();

        let before = self.known.len();
        self.known
            .retain(|_, known| now.saturating_duration_since(known.seen_at) <= self.known_retention);
        let seeds = before.saturating_sub(self.known.len());

        let before = self.invalidations.len();
        self.invalidations.retain(|key, inv| {
            now.saturating_duration_since(inv.at) <= self.invalidation_retention(key, inv)
        });
        let invalidations = before.saturating_sub(self.invalidations.len());

        if seeds + invalidations > 0 {
            debug!(
                "Session sweep removed {} seed(s) and {} invalidation record(s)",
                seeds, invalidations
            );
        }
        seeds + invalidations
    }
}
