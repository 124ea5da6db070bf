//! Finnhub market data provider implementation.
//!
//! This module provides market data from Finnhub API:
//! - Quotes via /quote
//! - Company profiles via /stock/profile2
//! - Price history via /stock/candle
//! - Company news via /company-news
//!
//! Finnhub free tier is limited to 60 API calls per minute.
//! API documentation: https://finnhub.io/docs/api

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::MarketDataError;
use crate::models::{
    CompanyProfile, DataKind, Interval, MarketData, NewsArticle, PricePoint, Quote, RequestKind,
    Symbol,
};
use crate::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};

const BASE_URL: &str = "https://finnhub.io/api/v1";
const HOST: &str = "finnhub.io";
const PROVIDER_ID: &str = "FINNHUB";

/// How far back /company-news is queried.
const NEWS_LOOKBACK_DAYS: i64 = 7;

// ============================================================================
// API Response Structures
// ============================================================================

/// Response from /quote endpoint
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price
    c: Option<f64>,
    /// High price of the day
    h: Option<f64>,
    /// Low price of the day
    l: Option<f64>,
    /// Open price of the day
    o: Option<f64>,
    /// Previous close
    pc: Option<f64>,
    /// Timestamp (Unix)
    t: Option<i64>,
}

/// Response from /stock/candle endpoint
#[derive(Debug, Deserialize)]
struct CandleResponse {
    /// Status: "ok" or "no_data"
    s: String,
    /// Close prices
    #[serde(default)]
    c: Vec<f64>,
    /// Volume
    #[serde(default)]
    v: Vec<f64>,
    /// Timestamps (Unix)
    #[serde(default)]
    t: Vec<i64>,
}

/// Response from /stock/profile2 endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileResponse {
    name: Option<String>,
    ticker: Option<String>,
    /// Finnhub industry classification
    finnhub_industry: Option<String>,
    country: Option<String>,
    weburl: Option<String>,
    logo: Option<String>,
    /// Market capitalization (in millions)
    market_capitalization: Option<f64>,
}

/// Item of the /company-news response
#[derive(Debug, Deserialize)]
struct NewsItem {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    url: String,
    source: Option<String>,
    /// Unix seconds
    datetime: Option<i64>,
    summary: Option<String>,
    image: Option<String>,
}

/// Error response from Finnhub
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<String>,
}

// ============================================================================
// FinnhubProvider
// ============================================================================

/// Finnhub market data provider.
///
/// Serves every data kind for US equities.
pub struct FinnhubProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl FinnhubProvider {
    /// Create a new Finnhub provider with the given API key.
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

    /// Make a GET request to the Finnhub API.
    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String, MarketDataError> {
        let url = format!("{}{}", self.base_url, endpoint);

        debug!("Finnhub request: {} with {} params", endpoint, params.len());

        // API key as header rather than query param keeps it out of logs
        let response = self
            .client
            .get(&url)
            .header("X-Finnhub-Token", &self.api_key)
            .query(params)
            .send()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, e))?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|e| {
                debug!("Finnhub: failed to read error body: {}", e);
                String::new()
            });
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error)
                .unwrap_or(body);

            return Err(MarketDataError::from_status(PROVIDER_ID, status, &detail)
                .unwrap_or_else(|| MarketDataError::fatal(PROVIDER_ID, format!("HTTP {}", status))));
        }

        response
            .text()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, e))
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, MarketDataError> {
        let text = self
            .get("/quote", &[("symbol", symbol.to_string())])
            .await?;
        parse_quote(symbol, &text)
    }

    async fn fetch_profile(&self, symbol: &Symbol) -> Result<CompanyProfile, MarketDataError> {
        let text = self
            .get("/stock/profile2", &[("symbol", symbol.to_string())])
            .await?;
        parse_profile(symbol, &text)
    }

    async fn fetch_history(
        &self,
        symbol: &Symbol,
        interval: Interval,
    ) -> Result<Vec<PricePoint>, MarketDataError> {
        let end = Utc::now();
        let start = end - interval.span();

        let params = [
            ("symbol", symbol.to_string()),
            ("resolution", interval.resolution().to_string()),
            ("from", start.timestamp().to_string()),
            ("to", end.timestamp().to_string()),
        ];

        let text = self.get("/stock/candle", &params).await?;
        let points = parse_candles(&text)?;

        debug!(
            "Finnhub: fetched {} points of {} history for {}",
            points.len(),
            interval,
            symbol
        );
        Ok(points)
    }

    async fn fetch_news(&self, symbol: &Symbol, limit: u32) -> Result<Vec<NewsArticle>, MarketDataError> {
        let to = Utc::now().date_naive();
        let from = to - chrono::Duration::days(NEWS_LOOKBACK_DAYS);

        let params = [
            ("symbol", symbol.to_string()),
            ("from", from.format("%Y-%m-%d").to_string()),
            ("to", to.format("%Y-%m-%d").to_string()),
        ];

        let text = self.get("/company-news", &params).await?;
        parse_news(&text, limit as usize)
    }
}

// ============================================================================
// MarketDataProvider Implementation
// ============================================================================

#[async_trait]
impl MarketDataProvider for FinnhubProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn host(&self) -> &'static str {
        HOST
    }

    fn priority(&self) -> u8 {
        // General-purpose fallback behind the dedicated history and news sources
        2
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            kinds: &[
                DataKind::Quote,
                DataKind::Details,
                DataKind::History,
                DataKind::News,
            ],
        }
    }

    fn rate_limit(&self) -> RateLimit {
        // Free tier limit
        RateLimit::per_minute(60)
    }

    async fn fetch(&self, symbol: &Symbol, kind: &RequestKind) -> Result<MarketData, MarketDataError> {
        match kind {
            RequestKind::Quote => self.fetch_quote(symbol).await.map(MarketData::Quote),
            RequestKind::Details => self.fetch_profile(symbol).await.map(MarketData::Details),
            RequestKind::History(interval) => self
                .fetch_history(symbol, *interval)
                .await
                .map(MarketData::History),
            RequestKind::News(limit) => self.fetch_news(symbol, *limit).await.map(MarketData::News),
        }
    }
}

// ============================================================================
// Response Parsing
// ============================================================================

fn parse_error(what: &str, e: serde_json::Error) -> MarketDataError {
    MarketDataError::fatal(PROVIDER_ID, format!("Failed to parse {} response: {}", what, e))
}

fn to_decimal(value: f64) -> Option<Decimal> {
    Decimal::try_from(value).ok().map(|d| d.round_dp(4))
}

fn parse_quote(symbol: &Symbol, text: &str) -> Result<Quote, MarketDataError> {
    let response: QuoteResponse = serde_json::from_str(text).map_err(|e| parse_error("quote", e))?;

    // Finnhub returns zeros for unknown symbols instead of an error
    let price = response
        .c
        .filter(|c| *c > 0.0)
        .and_then(to_decimal)
        .ok_or_else(|| {
            MarketDataError::fatal(PROVIDER_ID, format!("No quote data for symbol: {}", symbol))
        })?;

    let timestamp = response
        .t
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or_else(Utc::now);

    let mut quote = Quote::new(symbol.as_str(), price, PROVIDER_ID);
    quote.timestamp = timestamp;
    quote.open = response.o.and_then(to_decimal);
    quote.high = response.h.and_then(to_decimal);
    quote.low = response.l.and_then(to_decimal);

    match response.pc.and_then(to_decimal) {
        Some(previous_close) => Ok(quote.with_previous_close(previous_close)),
        None => Ok(quote),
    }
}

fn parse_profile(symbol: &Symbol, text: &str) -> Result<CompanyProfile, MarketDataError> {
    // Unknown symbols come back as an empty object
    if text.trim() == "{}" {
        return Err(MarketDataError::fatal(
            PROVIDER_ID,
            format!("No profile data for symbol: {}", symbol),
        ));
    }

    let response: ProfileResponse =
        serde_json::from_str(text).map_err(|e| parse_error("profile", e))?;

    Ok(CompanyProfile {
        symbol: response.ticker.unwrap_or_else(|| symbol.to_string()),
        name: response.name,
        sector: response.finnhub_industry.clone(),
        industry: response.finnhub_industry,
        website: response.weburl,
        country: response.country,
        logo_url: response.logo,
        // Finnhub reports market cap in millions
        market_cap: response.market_capitalization.map(|mc| mc * 1_000_000.0),
        source: Some(PROVIDER_ID.to_string()),
        ..Default::default()
    })
}

fn parse_candles(text: &str) -> Result<Vec<PricePoint>, MarketDataError> {
    let response: CandleResponse =
        serde_json::from_str(text).map_err(|e| parse_error("candle", e))?;

    if response.s != "ok" {
        return Err(MarketDataError::fatal(
            PROVIDER_ID,
            format!("Candle status: {}", response.s),
        ));
    }

    if response.c.len() != response.t.len() {
        return Err(MarketDataError::fatal(
            PROVIDER_ID,
            "Mismatched array lengths in candle response",
        ));
    }

    let mut points = Vec::with_capacity(response.t.len());
    for (i, (&ts, &close)) in response.t.iter().zip(response.c.iter()).enumerate() {
        let Some(timestamp) = Utc.timestamp_opt(ts, 0).single() else {
            warn!("Invalid timestamp at index {}: {}", i, ts);
            continue;
        };
        let Some(price) = to_decimal(close) else {
            warn!("Invalid close price at index {}: {}", i, close);
            continue;
        };
        let volume = response.v.get(i).map(|v| v.max(0.0) as u64).unwrap_or(0);

        points.push(PricePoint::new(timestamp, price, volume));
    }

    points.sort_by_key(|p| p.timestamp);
    Ok(points)
}

fn parse_news(text: &str, limit: usize) -> Result<Vec<NewsArticle>, MarketDataError> {
    let items: Vec<NewsItem> = serde_json::from_str(text).map_err(|e| parse_error("news", e))?;

    Ok(items
        .into_iter()
        .filter(|item| !item.headline.is_empty() && !item.url.is_empty())
        .take(limit)
        .map(|item| NewsArticle {
            title: item.headline,
            url: item.url,
            source: item.source,
            published_at: item
                .datetime
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
            summary: item.summary.filter(|s| !s.is_empty()),
            thumbnail: item.image.filter(|s| !s.is_empty()),
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================
