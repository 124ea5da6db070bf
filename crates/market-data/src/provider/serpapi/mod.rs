//! SerpApi news provider.
//!
//! Serves company news through SerpApi's Google News engine
//! (https://serpapi.com/google-news-api). News only; no prices.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::errors::MarketDataError;
use crate::models::{DataKind, MarketData, NewsArticle, RequestKind, Symbol};
use crate::provider::{MarketDataProvider, ProviderCapabilities, RateLimit};

const BASE_URL: &str = "https://serpapi.com/search";
const HOST: &str = "serpapi.com";
const PROVIDER_ID: &str = "SERPAPI";

/// Format of the `date` field, e.g. "01/15/2024, 08:00 AM, +0000 UTC".
const DATE_FORMAT: &str = "%m/%d/%Y, %I:%M %p, %z UTC";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    news_results: Vec<NewsResult>,
    /// Set on quota or key problems, sometimes with HTTP 200
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    source: Option<NewsSource>,
    date: Option<String>,
    snippet: Option<String>,
    thumbnail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NewsSource {
    name: Option<String>,
}

/// Google News through SerpApi.
pub struct SerpApiNewsProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl SerpApiNewsProvider {
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

    /// Point the provider at a different search endpoint (proxies, sandboxes).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn search_news(&self, symbol: &Symbol, limit: u32) -> Result<Vec<NewsArticle>, MarketDataError> {
        let query = format!("{} stock", symbol);
        let num = limit.to_string();

        debug!("SerpApi news request for {}", symbol);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("engine", "google_news"),
                ("q", query.as_str()),
                ("num", num.as_str()),
                ("api_key", self.api_key.as_str()),
            ])
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
impl MarketDataProvider for SerpApiNewsProvider {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    fn host(&self) -> &'static str {
        HOST
    }

    fn priority(&self) -> u8 {
        // Preferred news source, ahead of the generic providers
        0
    }

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities {
            kinds: &[DataKind::News],
        }
    }

    fn rate_limit(&self) -> RateLimit {
        RateLimit::per_minute(30)
    }

    async fn fetch(&self, symbol: &Symbol, kind: &RequestKind) -> Result<MarketData, MarketDataError> {
        match kind {
            RequestKind::News(limit) => self.search_news(symbol, *limit).await.map(MarketData::News),
            other => Err(MarketDataError::UnsupportedKind(format!(
                "{} does not serve {}",
                PROVIDER_ID, other
            ))),
        }
    }
}

fn parse_news(text: &str, limit: usize) -> Result<Vec<NewsArticle>, MarketDataError> {
    let response: SearchResponse = serde_json::from_str(text).map_err(|e| {
        MarketDataError::fatal(PROVIDER_ID, format!("Failed to parse news response: {}", e))
    })?;

    if response.news_results.is_empty() {
        let reason = response
            .error
            .unwrap_or_else(|| "No news_results in response".to_string());
        return Err(MarketDataError::fatal(PROVIDER_ID, reason));
    }

    Ok(response
        .news_results
        .into_iter()
        .filter(|item| !item.title.is_empty() && !item.link.is_empty())
        .take(limit)
        .map(|item| NewsArticle {
            title: item.title,
            url: item.link,
            source: item.source.and_then(|s| s.name),
            published_at: item.date.as_deref().and_then(parse_date),
            summary: item.snippet,
            thumbnail: item.thumbnail,
        })
        .collect())
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_news_parsing() {
        let json = r#"{
            "search_metadata": {"status": "Success"},
            "news_results": [
                {
                    "position": 1,
                    "title": "Apple shares climb",
                    "link": "https://example.com/apple",
                    "source": {"name": "Reuters", "icon": "https://example.com/icon.png"},
                    "date": "01/15/2024, 08:00 AM, +0000 UTC",
                    "snippet": "Shares rose",
                    "thumbnail": "https://example.com/thumb.jpg"
                },
                {"position": 2, "title": "Missing link"}
            ]
        }"#;

        let articles = parse_news(json, 10).unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].source.as_deref(), Some("Reuters"));
        assert_eq!(
            articles[0].published_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_error_payload_is_fatal() {
        let err = parse_news(r#"{"error": "Invalid API key."}"#, 5).unwrap_err();
        match err {
            MarketDataError::ProviderFatal { message, .. } => assert_eq!(message, "Invalid API key."),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_base_url_override() {
        let provider = SerpApiNewsProvider::new("key".to_string()).with_base_url("http://localhost/search");
        assert_eq!(provider.base_url, "http://localhost/search");
    }

    #[test]
    fn test_unparsable_date_is_dropped() {
        assert!(parse_date("2 hours ago").is_none());
    }

    #[test]
    fn test_only_serves_news() {
        let provider = SerpApiNewsProvider::new("key".to_string());
        let caps = provider.capabilities();
        assert!(caps.supports(DataKind::News));
        assert!(!caps.supports(DataKind::Quote));
        assert_eq!(provider.rate_limit().min_interval, Duration::from_secs(2));
    }
}
