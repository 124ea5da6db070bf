//! Market data provider trait definitions.
//!
//! This module defines the core `MarketDataProvider` trait that all
//! market data providers must implement.

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::{MarketData, RequestKind, Symbol};

use super::capabilities::{ProviderCapabilities, RateLimit};

/// Trait for market data providers.
///
/// Implement this trait to add support for a new market data source.
/// The chain uses the provider's capabilities, priority and health to
/// decide when to call it, and its host and rate limit to pace the calls.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use borsvy_market_data::models::{DataKind, MarketData, RequestKind, Symbol};
/// use borsvy_market_data::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};
///
/// struct MyProvider {
///     api_key: String,
/// }
///
/// #[async_trait]
/// impl MarketDataProvider for MyProvider {
///     fn id(&self) -> &'static str {
///         "MY_PROVIDER"
///     }
///
///     fn host(&self) -> &'static str {
///         "api.example.com"
///     }
///
///     fn capabilities(&self) -> ProviderCapabilities {
///         ProviderCapabilities {
///             kinds: &[DataKind::Quote],
///         }
///     }
///
///     async fn fetch(&self, symbol: &Symbol, kind: &RequestKind) -> Result<MarketData, MarketDataError> {
///         // ... call the API
///     }
/// }
/// ```
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Unique identifier for this provider.
    ///
    /// Should be a constant string like "FINNHUB", "SERPAPI", etc.
    /// Used for logging, health tracking, and result origin tagging.
    fn id(&self) -> &'static str;

    /// Upstream host this provider talks to.
    ///
    /// Providers sharing a host share one pacing slot. Defaults to the id.
    fn host(&self) -> &'static str {
        self.id()
    }

    /// Provider priority for ordering.
    ///
    /// Lower values = tried first. Default is 10.
    fn priority(&self) -> u8 {
        10
    }

    /// Request kinds this provider can serve.
    fn capabilities(&self) -> ProviderCapabilities;

    /// Pacing applied to calls against [`host`](Self::host).
    fn rate_limit(&self) -> RateLimit {
        RateLimit::default()
    }

    /// Fetch one payload.
    ///
    /// Only called with kinds listed in [`capabilities`](Self::capabilities).
    /// Transient upstream failures must be reported as
    /// [`MarketDataError::ProviderRetryable`], everything else as
    /// [`MarketDataError::ProviderFatal`].
    async fn fetch(&self, symbol: &Symbol, kind: &RequestKind)
        -> Result<MarketData, MarketDataError>;
}
