//! Shared fixtures for the resolver integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use borsvy_market_data::{
    DataKind, InMemoryStore, MarketData, MarketDataError, MarketDataProvider, ProviderCapabilities,
    Quote, RateLimit, RequestKind, Resolver, ResolverConfig, Symbol, TransientCause,
};

/// What a mock provider answers with.
#[derive(Clone, Debug)]
pub enum Behavior {
    /// Quote at a fixed price.
    Quote(Decimal),
    /// HTTP 429 on every call.
    Throttled,
    /// HTTP 401 on every call.
    Broken,
}

pub struct MockProvider {
    id: &'static str,
    priority: u8,
    behavior: Behavior,
    delay: Option<Duration>,
    call_count: AtomicUsize,
}

impl MockProvider {
    fn new(id: &'static str, priority: u8, behavior: Behavior) -> Self {
        Self {
            id,
            priority,
            behavior,
            delay: None,
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn quoting(id: &'static str, priority: u8, price: Decimal) -> Self {
        Self::new(id, priority, Behavior::Quote(price))
    }

    pub fn throttled(id: &'static str, priority: u8) -> Self {
        Self::new(id, priority, Behavior::Throttled)
    }

    pub fn broken(id: &'static str, priority: u8) -> Self {
        Self::new(id, priority, Behavior::Broken)
    }

    /// Every call takes `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    fn id(&self) -> &'static str {
        self.id
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            kinds: &[DataKind::Quote],
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit::unlimited()
    }

    async fn fetch(&self, symbol: &Symbol, _kind: &RequestKind) -> Result<MarketData, MarketDataError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            Behavior::Quote(price) => Ok(MarketData::Quote(
                Quote::new(symbol.as_str(), *price, self.id).with_volume(1_000_000),
            )),
            Behavior::Throttled => Err(MarketDataError::retryable(
                self.id,
                TransientCause::TooManyRequests,
            )),
            Behavior::Broken => Err(MarketDataError::fatal(self.id, "HTTP 401 Unauthorized")),
        }
    }
}

/// Resolver with default config over `providers` and an empty in-memory store.
pub fn resolver_with(providers: &[Arc<MockProvider>]) -> (Resolver, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let resolver = Resolver::new(
        ResolverConfig::default(),
        providers
            .iter()
            .map(|p| p.clone() as Arc<dyn MarketDataProvider>)
            .collect(),
        store.clone(),
    );
    (resolver, store)
}
