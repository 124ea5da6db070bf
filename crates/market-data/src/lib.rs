//! Borsvy Market Data Crate
//!
//! This crate answers stock market data requests (quotes, company profiles,
//! price history, news) from several unreliable, rate-limited providers and
//! degrades to clearly tagged placeholder data instead of failing.
//!
//! # Overview
//!
//! - Layered lookup: in-memory cache, persistent store, provider chain
//! - Per-host pacing, retry with exponential backoff, provider health
//! - Single-flight deduplication of concurrent identical requests
//! - A hard deadline per resolution
//! - Seeded synthetic fallback that stays close to the last real value
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |     Resolver     |  resolve(symbol, kind) -> Resolution
//! +------------------+
//!    |      |      |
//!    v      v      v
//! +-------+ +-------+ +------------------+     +-------------+
//! | Cache | | Store | |  ProviderChain   | --> |  Providers  |  (Polygon, SerpApi, RapidAPI, Finnhub)
//! +-------+ +-------+ +------------------+     +-------------+
//!                      | pacing, backoff,
//!                      | health, validation
//!                              |
//!                              v  (all failed / deadline)
//!                      +------------------+
//!                      |   Synthesizer    |
//!                      +------------------+
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use borsvy_market_data::{
//!     FinnhubProvider, InMemoryStore, MarketDataProvider, PolygonProvider, RapidApiNewsProvider,
//!     Resolver, ResolverConfig, SerpApiNewsProvider,
//! };
//!
//! let providers: Vec<Arc<dyn MarketDataProvider>> = vec![
//!     Arc::new(PolygonProvider::new(polygon_key)),
//!     Arc::new(SerpApiNewsProvider::new(serpapi_key)),
//!     Arc::new(RapidApiNewsProvider::new(rapidapi_key)),
//!     Arc::new(FinnhubProvider::new(finnhub_key)),
//! ];
//! let resolver = Resolver::new(ResolverConfig::from_env(), providers, Arc::new(InMemoryStore::new()));
//! let _sweeper = resolver.spawn_sweeper();
//!
//! let quote = resolver.quote("AAPL").await?;
//! println!("{} from {} (stale: {})", quote.value.price, quote.origin, quote.is_stale);
//! ```
//!
//! # Core Types
//!
//! - [`Resolver`] - Orchestrates one request from cache to synthesis
//! - [`Resolution`] - Value tagged with its [`Origin`] and staleness
//! - [`RequestKind`] - Quote, Details, History(interval) or News(limit)
//! - [`MarketDataProvider`] - Capability-tagged upstream source
//! - [`MarketDataStore`] - Persistent second tier

pub mod cache;
pub mod config;
pub mod errors;
pub mod models;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod synth;

// Re-export the request/response types
pub use models::{
    CompanyProfile, DataKind, HostId, Interval, MarketData, NewsArticle, Origin, PricePoint,
    ProviderId, Quote, RequestKey, RequestKind, Resolution, Symbol,
};

pub use cache::{SweeperHandle, TtlCache};
pub use config::{BackoffConfig, ResolverConfig, StorePolicy, TtlPolicy};
pub use errors::{MarketDataError, RetryClass, TransientCause};
pub use resolver::Resolver;
pub use store::{InMemoryStore, MarketDataStore, StoredRecord};
pub use synth::Synthesizer;

// Re-export provider types
pub use provider::finnhub::FinnhubProvider;
pub use provider::polygon::PolygonProvider;
pub use provider::rapidapi::RapidApiNewsProvider;
pub use provider::serpapi::SerpApiNewsProvider;
pub use provider::{MarketDataProvider, ProviderCapabilities, RateLimit};

// Re-export registry types
pub use registry::{
    BackoffPolicy, FetchDiagnostics, HealthSnapshot, HealthState, PayloadValidator,
    ProviderChain, SkipReason,
};
