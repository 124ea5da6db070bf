//! Market data provider abstractions and implementations.
//!
//! This module contains:
//! - The `MarketDataProvider` trait that all providers implement
//! - Provider capabilities and pacing configuration
//! - Concrete provider implementations (Polygon, SerpApi, RapidAPI, Finnhub)
//!
//! # Architecture
//!
//! The provider system is designed to be:
//! - **Provider-agnostic**: The chain only sees capability tags, priorities and hosts
//! - **Extensible**: New providers can be added by implementing `MarketDataProvider`
//! - **Resilient**: Pacing, retries and health tracking live outside the providers
//!
//! Providers only translate HTTP outcomes into `ProviderRetryable` or
//! `ProviderFatal`; what happens next is decided by the chain.

mod capabilities;
mod traits;

pub mod finnhub;
pub mod polygon;
pub mod rapidapi;
pub mod serpapi;

pub use capabilities::{ProviderCapabilities, RateLimit};
pub use traits::MarketDataProvider;
