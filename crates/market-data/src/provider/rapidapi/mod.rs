//! Yahoo Finance news through RapidAPI.
//!
//! Uses the `yahoo-finance15` listing's `/api/v1/markets/news` endpoint.
//! News only. Requests carry the `x-rapidapi-key` / `x-rapidapi-host`
//! header pair instead of a query parameter.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{DataKind, MarketData, NewsArticle, RequestKind, Symbol};
use crate::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};

const DEFAULT_HOST: &str = "yahoo-finance15.p.rapidapi.com";
const HOST: &str = "rapidapi.com";
const PROVIDER_ID: &str = "RAPIDAPI";
const NEWS_PATH: &str = "/api/v1/markets/news";

/// The listing has shipped the article array under several keys.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NewsEnvelope {
    Body { body: Vec<NewsItem> },
    Data { data: Vec<NewsItem> },
    Bare(Vec<NewsItem>),
    Error { message: String },
}

#[derive(Debug, Deserialize)]
struct NewsItem {
    #[serde(default)]
    title: String,
    link: Option<String>,
    url: Option<String>,
    source: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    text: Option<String>,
    img: Option<String>,
    image_url: Option<String>,
    thumbnail: Option<String>,
    image: Option<String>,
}

impl NewsItem {
    fn into_article(self) -> Option<NewsArticle> {
        let non_empty = |s: &String| !s.is_empty();
        let url = self.link.filter(non_empty).or(self.url.filter(non_empty))?;
        if self.title.is_empty() {
            return None;
        }

        let published_at = self.pub_date.as_deref().and_then(parse_date);
        let thumbnail = [self.img, self.image_url, self.thumbnail, self.image]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty());

        Some(NewsArticle {
            title: self.title,
            url,
            source: self.source.or_else(|| Some("Yahoo Finance".to_string())),
            published_at,
            summary: self.text.filter(|s| !s.is_empty()),
            thumbnail,
        })
    }
}

/// Yahoo Finance news via RapidAPI.
pub struct RapidApiNewsProvider {
    client: Client,
    api_key: String,
    api_host: String,
}

impl RapidApiNewsProvider {
    pub fn new(api_key: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_key,
            api_host: DEFAULT_HOST.to_string(),
        }
    }

    /// Use another RapidAPI listing that serves the same news shape.
    pub fn with_api_host(mut self, api_host: impl Into<String>) -> Self {
        self.api_host = api_host.into();
        self
    }

    async fn fetch_news(&self, symbol: &Symbol, limit: u32) -> Result<Vec<NewsArticle>, MarketDataError> {
        let url = format!("https://{}{}", self.api_host, NEWS_PATH);

        debug!("RapidAPI news request for {}", symbol);

        let response = self
            .client
            .get(&url)
            .header("x-rapidapi-key", &self.api_key)
            .header("x-rapidapi-host", &self.api_host)
            .query(&[("tickers", symbol.as_str())])
            .send()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, e))?;

        if let Some(error) = MarketDataError::from_status(PROVIDER_ID, status, &body) {
            return Err(error);
        }

        parse_news(&body, limit as usize)
    }
}

#[async_trait]
impl MarketDataProvider for RapidApiNewsProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn host(&self) -> &'static str {
        HOST
    }

    fn priority(&self) -> u8 {
        // Second news source, after SerpApi
        1
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            kinds: &[DataKind::News],
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit::per_minute(10)
    }

    async fn fetch(&self, symbol: &Symbol, kind: &RequestKind) -> Result<MarketData, MarketDataError> {
        match kind {
            RequestKind::News(limit) => self.fetch_news(symbol, *limit).await.map(MarketData::News),
            other => Err(MarketDataError::UnsupportedKind(format!(
                "{} does not serve {}",
                PROVIDER_ID, other
            ))),
        }
    }
}

fn parse_news(text: &str, limit: usize) -> Result<Vec<NewsArticle>, MarketDataError> {
    let envelope: NewsEnvelope = serde_json::from_str(text).map_err(|e| {
        MarketDataError::fatal(PROVIDER_ID, format!("Failed to parse news response: {}", e))
    })?;

    let items = match envelope {
        NewsEnvelope::Body { body: items }
        | NewsEnvelope::Data { data: items }
        | NewsEnvelope::Bare(items) => items,
        NewsEnvelope::Error { message } => return Err(MarketDataError::fatal(PROVIDER_ID, message)),
    };

    let articles: Vec<NewsArticle> = items
        .into_iter()
        .filter_map(NewsItem::into_article)
        .take(limit)
        .collect();

    // An empty page lets the next news source have a go
    if articles.is_empty() {
        return Err(MarketDataError::fatal(PROVIDER_ID, "No usable articles in response"));
    }
    Ok(articles)
}

/// ISO-8601 (`2025-04-08T11:06:58Z`) or RFC 2822 (`Tue, 08 Apr 2025 11:06:58 +0000`).
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
