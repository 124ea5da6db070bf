//! Polygon.io history provider.
//!
//! Price history via the aggregates endpoint:
//! `/v2/aggs/ticker/{symbol}/range/{multiplier}/{timespan}/{from}/{to}`.
//!
//! Free tier allows 5 calls per minute.
//! API documentation: https://polygon.io/docs/stocks/get_v2_aggs_ticker__stocksticker__range__multiplier___timespan___from___to

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::MarketDataError;
use crate::models::{DataKind, Interval, MarketData, PricePoint, RequestKind, Symbol};
use crate::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};

const BASE_URL: &str = "https://api.polygon.io";
const HOST: &str = "api.polygon.io";
const PROVIDER_ID: &str = "POLYGON";

/// Response from the aggregates endpoint
#[derive(Debug, Deserialize)]
struct AggregatesResponse {
    /// "OK", "DELAYED", "ERROR", "NOT_AUTHORIZED"
    #[serde(default)]
    status: String,
    #[serde(default)]
    results: Vec<AggregateBar>,
    error: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AggregateBar {
    /// Close price
    c: f64,
    /// Volume
    #[serde(default)]
    v: f64,
    /// Bar start, Unix milliseconds
    t: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
    message: Option<String>,
}

/// Polygon.io aggregates, history only.
pub struct PolygonProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl PolygonProvider {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point the provider at a different API root (proxies, sandboxes).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn aggregates_path(symbol: &Symbol, interval: Interval) -> String {
        let end = Utc::now();
        let start = end - interval.span();
        let (multiplier, timespan) = bar_size(interval);

        format!(
            "/v2/aggs/ticker/{}/range/{}/{}/{}/{}",
            symbol,
            multiplier,
            timespan,
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d")
        )
    }

    async fn fetch_history(
        &self,
        symbol: &Symbol,
        interval: Interval,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        let url = format!("{}{}", self.base_url, Self::aggregates_path(symbol, interval));

        debug!("Polygon aggregates request for {} ({})", symbol, interval);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("adjusted", "true"), ("sort", "asc"), ("limit", "50000")])
            .send()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, e))?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                debug!("Polygon: failed to read error body: {}", e);
                String::new()
            });
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error.or(e.message))
                .unwrap_or(body);

            return Err(MarketDataError::from_status(PROVIDER_ID, status, &detail)
                .unwrap_or_else(|| MarketDataError::fatal(PROVIDER_ID, format!("HTTP {}", status))));
        }

        let text = response
            .text()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, e))?;
        let points = parse_aggregates(&text)?;

        debug!(
            "Polygon: fetched {} points of {} history for {}",
            points.len(),
            interval,
            symbol
        );
        Ok(points)
    }
}

#[async_trait]
impl MarketDataProvider for PolygonProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn host(&self) -> &'static str {
        HOST
    }

    fn priority(&self) -> u8 {
        // Dedicated history source, ahead of Finnhub candles
        0
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            kinds: &[DataKind::History],
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit::per_minute(5)
    }

    async fn fetch(&self, symbol: &Symbol, kind: &RequestKind) -> Result<MarketData, MarketDataError> {
        match kind {
            RequestKind::History(interval) => self
                .fetch_history(symbol, *interval)
                .await
                .map(MarketData::History),
            other => Err(MarketDataError::UnsupportedKind(format!(
                "{} does not serve {}",
                PROVIDER_ID, other
            ))),
        }
    }
}

/// Bar multiplier and timespan for an interval.
fn bar_size(interval: Interval) -> (u32, &'static str) {
    match interval {
        Interval::OneDay => (1, "minute"),
        Interval::OneWeek => (1, "hour"),
        _ => (1, "day"),
    }
}

fn parse_aggregates(text: &str) -> Result<Vec<PricePoint>, MarketDataError> {
    let response: AggregatesResponse = serde_json::from_str(text).map_err(|e| {
        MarketDataError::fatal(PROVIDER_ID, format!("Failed to parse aggregates response: {}", e))
    })?;

    // Errors sometimes arrive with HTTP 200
    if response.results.is_empty() {
        let reason = response
            .error
            .or(response.message)
            .unwrap_or_else(|| format!("No aggregates in response (status {})", response.status));
        return Err(MarketDataError::fatal(PROVIDER_ID, reason));
    }

    let mut points = Vec::with_capacity(response.results.len());
    for (i, bar) in response.results.iter().enumerate() {
        let Some(timestamp) = Utc.timestamp_millis_opt(bar.t).single() else {
            warn!("Invalid timestamp at index {}: {}", i, bar.t);
            continue;
        };
        let Some(price) = Decimal::try_from(bar.c).ok().map(|d| d.round_dp(4)) else {
            warn!("Invalid close price at index {}: {}", i, bar.c);
            continue;
        };

        points.push(PricePoint::new(timestamp, price, bar.v.max(0.0) as u64));
    }

    points.sort_by_key(|p| p.timestamp);
    points.dedup_by_key(|p| p.timestamp);
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::RetryClass;
    use rust_decimal_macros::dec;

    #[test]
    fn test_provider_metadata() {
        let provider = PolygonProvider::new("test_key".to_string());
        assert_eq!(provider.id(), "POLYGON");
        assert_eq!(provider.host(), "api.polygon.io");
        assert_eq!(provider.priority(), 0);
        assert_eq!(provider.rate_limit().min_interval, Duration::from_secs(12));

        let caps = provider.capabilities();
        assert!(caps.supports(DataKind::History));
        assert!(!caps.supports(DataKind::Quote));
        assert!(!caps.supports(DataKind::News));
    }

    #[test]
    fn test_base_url_override_drops_trailing_slash() {
        let provider = PolygonProvider::new("key".to_string()).with_base_url("http://localhost:9000/");
        assert_eq!(provider.base_url, "http://localhost:9000");
    }

    #[test]
    fn test_aggregates_path() {
        let symbol = Symbol::parse("aapl").unwrap();

        let path = PolygonProvider::aggregates_path(&symbol, Interval::OneDay);
        assert!(path.starts_with("/v2/aggs/ticker/AAPL/range/1/minute/"), "{path}");

        let path = PolygonProvider::aggregates_path(&symbol, Interval::OneYear);
        assert!(path.starts_with("/v2/aggs/ticker/AAPL/range/1/day/"), "{path}");
    }

    #[test]
    fn test_aggregates_parsing() {
        let json = r#"{
            "ticker": "AAPL",
            "queryCount": 3,
            "resultsCount": 3,
            "adjusted": true,
            "results": [
                {"v": 1200000, "vw": 151.9, "o": 151.5, "c": 152.0, "h": 153.0, "l": 151.0, "t": 1704240000000, "n": 900},
                {"v": 1000000, "vw": 150.1, "o": 149.5, "c": 150.0, "h": 151.0, "l": 149.0, "t": 1704067200000, "n": 800},
                {"v": 1100000, "vw": 150.8, "o": 150.5, "c": 151.0, "h": 152.0, "l": 150.0, "t": 1704153600000, "n": 850}
            ],
            "status": "OK",
            "request_id": "6a7e466379af0a71039d60cc78e72282",
            "count": 3
        }"#;

        let points = parse_aggregates(json).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].price, dec!(150));
        assert_eq!(points[0].volume, 1_000_000);
        assert_eq!(points[0].timestamp.timestamp(), 1704067200);
        assert!(crate::models::is_strictly_increasing(&points));
    }

    #[test]
    fn test_empty_results_are_fatal() {
        let json = r#"{"ticker": "ZZZZ", "resultsCount": 0, "status": "OK"}"#;
        let err = parse_aggregates(json).unwrap_err();
        assert_eq!(err.retry_class(), RetryClass::NextProvider);
    }

    #[test]
    fn test_error_payload_is_fatal() {
        let json = r#"{"status": "NOT_AUTHORIZED", "message": "Your plan doesn't include this data timeframe."}"#;
        match parse_aggregates(json).unwrap_err() {
            MarketDataError::ProviderFatal { message, .. } => {
                assert!(message.contains("plan"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
