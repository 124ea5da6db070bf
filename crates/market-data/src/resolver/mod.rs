//! Request orchestration.
//!
//! The [`Resolver`] is the only component that knows about all the others.
//! Per request it walks:
//!
//! ```text
//! cache ──hit──▶ Cache
//!   │ miss
//!   ▼
//! store ──fresh──▶ Store
//!   │ miss / stale / invalidated
//!   ▼
//! provider chain ──success──▶ Provider(id)   (written to cache, and to store in the background)
//!   │ exhausted / deadline
//!   ▼
//! synthesizer ──▶ Synthetic (is_stale = true)
//! ```
//!
//! Everything below the cache runs once per key at a time: concurrent
//! callers join the running walk and share its result. The walk is bounded
//! by a deadline; when it fires the current provider call is dropped and the
//! walk falls straight through to synthesis.
//!
//! Only request-level errors (bad symbol, unsupported kind) reach callers.

mod session;
mod single_flight;

pub use single_flight::{SharedFlight, SingleFlight};

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::time::{timeout_at, Instant};

use crate::cache::{spawn_sweeper, Sweep, SweeperHandle, TtlCache};
use crate::config::ResolverConfig;
use crate::errors::MarketDataError;
use crate::models::{
    CompanyProfile, Interval, MarketData, NewsArticle, Origin, PricePoint, Quote, RequestKey,
    RequestKind, Resolution, Symbol,
};
use crate::provider::MarketDataProvider;
use crate::registry::{BackoffPolicy, FetchDiagnostics, HealthSnapshot, ProviderChain};
use crate::store::{MarketDataStore, StoredRecord};
use crate::synth::Synthesizer;
use session::{Session, Ticket};

/// A cached payload, tagged with whether it was synthesized.
#[derive(Clone, Debug)]
struct CachedValue {
    data: MarketData,
    synthetic: bool,
}

struct Inner {
    config: ResolverConfig,
    cache: Arc<TtlCache<RequestKey, CachedValue>>,
    popular: Arc<TtlCache<(), Vec<Quote>>>,
    store: Arc<dyn MarketDataStore>,
    chain: ProviderChain,
    synthesizer: Synthesizer,
    flights: Arc<SingleFlight<RequestKey, Resolution>>,
    session: Arc<Session>,
}

/// Resolves (symbol, kind) requests to tagged results.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<Inner>,
}

impl Resolver {
    /// Build a resolver over `providers`, using the backoff settings from
    /// `config` for the chain.
    pub fn new(
        config: ResolverConfig,
        providers: Vec<Arc<dyn MarketDataProvider>>,
        store: Arc<dyn MarketDataStore>,
    ) -> Self {
        let chain =
            ProviderChain::with_policy(providers, BackoffPolicy::from_config(&config.backoff));
        Self::from_chain(config, chain, store)
    }

    /// Build a resolver over a preconfigured chain (custom priorities, validator).
    pub fn from_chain(
        config: ResolverConfig,
        chain: ProviderChain,
        store: Arc<dyn MarketDataStore>,
    ) -> Self {
        info!(
            "Market data resolver ready with {} provider(s), {:?} deadline",
            chain.providers().len(),
            config.deadline()
        );

        Self {
            inner: Arc::new(Inner {
                synthesizer: Synthesizer::new(config.synthetic_seed),
                session: Arc::new(Session::new(&config)),
                config,
                cache: Arc::new(TtlCache::new()),
                popular: Arc::new(TtlCache::new()),
                store,
                chain,
                flights: Arc::new(SingleFlight::new()),
            }),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.inner.config
    }

    /// Resolve one request.
    ///
    /// Never fails for upstream trouble: the worst outcome is a synthetic
    /// result with `is_stale` set. Fails only for an invalid symbol
    /// ([`MarketDataError::InvalidRequest`]) or unsupported kind parameters
    /// ([`MarketDataError::UnsupportedKind`]).
    pub async fn resolve(
        &self,
        symbol: &str,
        kind: RequestKind,
    ) -> Result<Resolution, MarketDataError> {
        let symbol = Symbol::parse(symbol)?;
        kind.validate(self.inner.config.max_news_limit)?;
        let key = RequestKey::new(symbol, kind);

        if let Some(hit) = self.inner.cache_hit(&key) {
            debug!("Cache hit for {}", key);
            return Ok(hit);
        }

        let inner = Arc::clone(&self.inner);
        let walk_key = key.clone();
        let fallback = {
            let synthesizer = self.inner.synthesizer.clone();
            let key = key.clone();
            move || Resolution::new(synthesizer.synthesize(&key, None), Origin::Synthetic, true)
        };

        let flight = self.inner.flights.run(
            key,
            async move { inner.walk(walk_key).await },
            fallback,
        );
        Ok(flight.await)
    }

    pub async fn quote(&self, symbol: &str) -> Result<Resolution<Quote>, MarketDataError> {
        typed(self.resolve(symbol, RequestKind::Quote).await?)
    }

    pub async fn details(&self, symbol: &str) -> Result<Resolution<CompanyProfile>, MarketDataError> {
        typed(self.resolve(symbol, RequestKind::Details).await?)
    }

    pub async fn history(
        &self,
        symbol: &str,
        interval: Interval,
    ) -> Result<Resolution<Vec<PricePoint>>, MarketDataError> {
        typed(self.resolve(symbol, RequestKind::History(interval)).await?)
    }

    pub async fn news(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Resolution<Vec<NewsArticle>>, MarketDataError> {
        typed(self.resolve(symbol, RequestKind::News(limit)).await?)
    }

    /// Force the next `resolve` for this key past the cache and store.
    ///
    /// Idempotent. A walk already running for the key finishes for its
    /// current waiters, but later callers start a new one and nothing the
    /// old walk produces is cached or stored.
    pub fn invalidate(&self, symbol: &str, kind: RequestKind) -> Result<(), MarketDataError> {
        let key = RequestKey::new(Symbol::parse(symbol)?, kind);

        self.inner.session.invalidate(&key);
        let removed = self.inner.cache.invalidate(&key);
        self.inner.flights.detach(&key);

        debug!("Invalidated {} (cached entry removed: {})", key, removed);
        Ok(())
    }

    /// Stored quotes of the configured popular symbols.
    ///
    /// Read from the store only, never from providers, and cached for the
    /// popular-list TTL. Symbols without a stored quote are left out.
    pub async fn popular(&self) -> Vec<Quote> {
        if let Some(quotes) = self.inner.popular.get_fresh(&()) {
            return quotes;
        }

        let symbols: Vec<Symbol> = self
            .inner
            .config
            .popular_symbols
            .iter()
            .filter_map(|raw| match Symbol::parse(raw) {
                Ok(symbol) => Some(symbol),
                Err(e) => {
                    warn!("Skipping popular symbol '{}': {}", raw, e);
                    None
                }
            })
            .collect();

        match self.inner.store.latest_quotes(&symbols).await {
            Ok(quotes) => {
                if !quotes.is_empty() {
                    self.inner
                        .popular
                        .put((), quotes.clone(), self.inner.config.ttl.popular());
                }
                quotes
            }
            Err(e) => {
                warn!("Failed to load popular quotes from store: {}", e);
                Vec::new()
            }
        }
    }

    /// Health of every provider in the chain.
    pub fn provider_health(&self) -> Vec<HealthSnapshot> {
        self.inner.chain.health_snapshot()
    }

    /// Start the background task that evicts expired cache entries, aged
    /// synthesis seeds and spent invalidation records.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        let targets: Vec<Arc<dyn Sweep>> = vec![
            self.inner.cache.clone() as Arc<dyn Sweep>,
            self.inner.popular.clone() as Arc<dyn Sweep>,
            self.inner.session.clone() as Arc<dyn Sweep>,
        ];
        spawn_sweeper(targets, self.inner.config.sweep_interval())
    }

    /// Number of walks currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.flights.len()
    }

    /// Number of entries in the request cache, expired ones included.
    pub fn cached_entries(&self) -> usize {
        self.inner.cache.len()
    }

    /// Number of real payloads kept as synthesis seeds.
    pub fn seed_entries(&self) -> usize {
        self.inner.session.known_len()
    }
}

impl Inner {
    fn cache_hit(&self, key: &RequestKey) -> Option<Resolution> {
        let cached = self.cache.get_fresh(key)?;
        Some(Resolution::new(cached.data, Origin::Cache, cached.synthetic))
    }

    /// Everything below the cache fast path, bounded by the deadline.
    async fn walk(&self, key: RequestKey) -> Resolution {
        let ticket = self.session.ticket();

        // Another walk may have filled the cache since the fast path missed
        if let Some(hit) = self.cache_hit(&key) {
            return hit;
        }

        let deadline = Instant::now() + self.config.deadline();
        match timeout_at(deadline, self.fetch_real(&key, ticket)).await {
            Ok(Some(resolution)) => resolution,
            Ok(None) => self.synthesize(&key, ticket),
            Err(_) => {
                warn!(
                    "{} for {} after {:?}, synthesizing",
                    MarketDataError::Timeout,
                    key,
                    self.config.deadline()
                );
                self.synthesize(&key, ticket)
            }
        }
    }

    /// Cache `value` under `key` unless the walk holding `ticket` was
    /// superseded by an invalidation.
    fn cache_put(&self, key: &RequestKey, ticket: Ticket, value: CachedValue, ttl: Duration) -> bool {
        if self.session.is_superseded(key, ticket) {
            debug!("Not caching {}: invalidated while the walk was running", key);
            return false;
        }
        self.cache.put(key.clone(), value, ttl);
        true
    }

    /// Store, then providers. `None` when neither produced real data.
    async fn fetch_real(&self, key: &RequestKey, ticket: Ticket) -> Option<Resolution> {
        if self.session.skips_store(key) {
            debug!("Skipping store for invalidated {}", key);
        } else if let Some(resolution) = self.check_store(key, ticket).await {
            return Some(resolution);
        }

        let mut diagnostics = FetchDiagnostics::new();
        match self
            .chain
            .fetch(&key.symbol, &key.kind, &mut diagnostics)
            .await
        {
            Ok((provider, data)) => {
                info!("Resolved {} from {} [{}]", key, provider, diagnostics.summary());
                self.accept(key, ticket, &data);
                Some(Resolution::new(data, Origin::Provider(provider), false))
            }
            Err(e) => {
                warn!("No provider could serve {}: {} [{}]", key, e, diagnostics.summary());
                None
            }
        }
    }

    async fn check_store(&self, key: &RequestKey, ticket: Ticket) -> Option<Resolution> {
        let record = match self.store.get(key).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                warn!("Store lookup failed for {}, treating as miss: {}", key, e);
                return None;
            }
        };

        if record.value.data_kind() != key.kind.data_kind() {
            warn!("Store returned a {} payload for {}", record.value.data_kind(), key);
            return None;
        }

        if !record.is_fresh(self.config.store.max_age(&key.kind)) {
            debug!(
                "Store record for {} is stale (updated {}), keeping as seed",
                key, record.last_updated
            );
            self.session.remember_if_absent(key, record.value);
            return None;
        }

        if let Some(ttl) = self.config.ttl.for_kind(&key.kind) {
            let value = CachedValue {
                data: record.value.clone(),
                synthetic: false,
            };
            self.cache_put(key, ticket, value, ttl);
        }
        self.session.remember(key, &record.value);

        Some(Resolution::new(record.value, Origin::Store, false))
    }

    /// Take a real provider payload into the cache, the seed table and, in
    /// the background, the store.
    ///
    /// A superseded walk only updates the seed table: its answer predates
    /// the invalidation and must not be served to anyone else.
    fn accept(&self, key: &RequestKey, ticket: Ticket, data: &MarketData) {
        self.session.remember(key, data);

        if let Some(ttl) = self.config.ttl.for_kind(&key.kind) {
            let value = CachedValue {
                data: data.clone(),
                synthetic: false,
            };
            if !self.cache_put(key, ticket, value, ttl) {
                return;
            }
        } else if self.session.is_superseded(key, ticket) {
            debug!("Not persisting {}: invalidated while the walk was running", key);
            return;
        }

        let store = Arc::clone(&self.store);
        let session = Arc::clone(&self.session);
        let key = key.clone();
        let record = StoredRecord::new(data.clone());
        tokio::spawn(async move {
            match store.save(&key, record).await {
                Ok(()) => session.settle(&key, ticket),
                Err(e) => warn!("Failed to persist {}: {}", key, e),
            }
        });
    }

    fn synthesize(&self, key: &RequestKey, ticket: Ticket) -> Resolution {
        let anchor = self.anchor_for(key);
        debug!(
            "Synthesizing {} ({})",
            key,
            if anchor.is_some() { "anchored" } else { "baseline" }
        );

        let data = self.synthesizer.synthesize(key, anchor.as_ref());

        if let Some(ttl) = self.config.ttl.for_kind(&key.kind) {
            let value = CachedValue {
                data: data.clone(),
                synthetic: true,
            };
            self.cache_put(key, ticket, value, ttl.min(self.config.ttl.synthetic()));
        }

        Resolution::new(data, Origin::Synthetic, true)
    }

    /// Best real payload to seed synthesis with.
    ///
    /// Expired real cache entry first, then the session table (which also
    /// holds stale store records). Price-bearing kinds fall back to each
    /// other: history to the last quote, quote to any known history.
    fn anchor_for(&self, key: &RequestKey) -> Option<MarketData> {
        if let Some(entry) = self.cache.get(key) {
            if !entry.value.synthetic {
                return Some(entry.value.data);
            }
        }

        if let Some(known) = self.session.seed(key) {
            return Some(known);
        }

        let lookup =
            |kind: RequestKind| self.session.seed(&RequestKey::new(key.symbol.clone(), kind));

        match key.kind {
            RequestKind::History(_) => lookup(RequestKind::Quote),
            RequestKind::Quote => Interval::ALL
                .iter()
                .find_map(|interval| lookup(RequestKind::History(*interval))),
            RequestKind::Details | RequestKind::News(_) => None,
        }
    }
}

fn typed<T>(resolution: Resolution) -> Result<Resolution<T>, MarketDataError>
where
    T: TryFrom<MarketData, Error = MarketData>,
{
    let Resolution {
        value,
        origin,
        is_stale,
    } = resolution;

    let value = T::try_from(value).map_err(|other| {
        MarketDataError::UnsupportedKind(format!(
            "Resolved payload has unexpected kind {}",
            other.data_kind()
        ))
    })?;
    Ok(Resolution::new(value, origin, is_stale))
}
