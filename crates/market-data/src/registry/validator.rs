//! Provider payload validation.
//!
//! Every payload a provider returns is checked before it is accepted:
//! - The payload kind matches the request
//! - Quotes: price > 0, high >= low, reasonable ranges
//! - History: non-empty, positive prices, strictly increasing timestamps
//! - Profiles: must carry a company name
//! - News: entries need a title and URL, list trimmed to the requested limit
//!
//! Hard failures become [`MarketDataError::ProviderFatal`] so the chain
//! moves on to the next provider. Soft issues are logged and the payload is
//! accepted.

use log::warn;
use rust_decimal::Decimal;

use crate::errors::MarketDataError;
use crate::models::{CompanyProfile, MarketData, NewsArticle, PricePoint, Quote, RequestKind};

/// Validation severity levels.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValidationSeverity {
    /// Reject the payload, try the next provider.
    Hard,
    /// Accept the payload but log a warning.
    Soft,
}

#[derive(Clone, Debug)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub message: String,
}

impl ValidationIssue {
    fn hard(message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Hard,
            message: message.into(),
        }
    }

    fn soft(message: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Soft,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ValidatorConfig {
    /// Prices above this are suspicious but accepted.
    pub max_price: Option<Decimal>,
    pub warn_on_zero_volume: bool,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_price: Some(Decimal::from(1_000_000_000i64)),
            warn_on_zero_volume: true,
        }
    }
}

/// Sanity checks for provider payloads.
pub struct PayloadValidator {
    config: ValidatorConfig,
}

impl PayloadValidator {
    pub fn new() -> Self {
        Self {
            config: ValidatorConfig::default(),
        }
    }

    pub fn with_config(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Validate and normalize a payload returned by `provider` for `kind`.
    ///
    /// History is sorted by timestamp with duplicate timestamps dropped;
    /// news is filtered and truncated. Everything else passes through
    /// unchanged.
    pub fn validate(
        &self,
        provider: &str,
        kind: &RequestKind,
        data: MarketData,
    ) -> Result<MarketData, MarketDataError> {
        if data.data_kind() != kind.data_kind() {
            return Err(MarketDataError::fatal(
                provider,
                format!(
                    "Payload kind mismatch: expected {}, got {}",
                    kind.data_kind(),
                    data.data_kind()
                ),
            ));
        }

        let mut issues = Vec::new();
        let normalized = match (kind, data) {
            (_, MarketData::Quote(quote)) => {
                self.check_quote(&quote, &mut issues);
                MarketData::Quote(quote)
            }
            (_, MarketData::Details(profile)) => {
                self.check_profile(&profile, &mut issues);
                MarketData::Details(profile)
            }
            (_, MarketData::History(points)) => {
                MarketData::History(self.normalize_history(points, &mut issues))
            }
            (RequestKind::News(limit), MarketData::News(articles)) => {
                MarketData::News(self.normalize_news(articles, *limit as usize, &mut issues))
            }
            (_, MarketData::News(articles)) => {
                MarketData::News(self.normalize_news(articles, usize::MAX, &mut issues))
            }
        };

        let errors: Vec<&str> = issues
            .iter()
            .filter(|i| i.severity == ValidationSeverity::Hard)
            .map(|i| i.message.as_str())
            .collect();

        if !errors.is_empty() {
            return Err(MarketDataError::fatal(
                provider,
                format!("Invalid payload: {}", errors.join("; ")),
            ));
        }

        for issue in issues.iter().filter(|i| i.severity == ValidationSeverity::Soft) {
            warn!("Payload validation warning from {}: {}", provider, issue.message);
        }

        Ok(normalized)
    }

    fn check_quote(&self, quote: &Quote, issues: &mut Vec<ValidationIssue>) {
        if quote.price <= Decimal::ZERO {
            issues.push(ValidationIssue::hard(format!(
                "Non-positive price: {}",
                quote.price
            )));
        }

        if let (Some(high), Some(low)) = (quote.high, quote.low) {
            if high < low {
                issues.push(ValidationIssue::hard(format!(
                    "High ({}) is less than Low ({})",
                    high, low
                )));
            } else if quote.price < low || quote.price > high {
                issues.push(ValidationIssue::soft(format!(
                    "Price ({}) is outside High/Low range ({}-{})",
                    quote.price, low, high
                )));
            }
        }

        if let Some(max_price) = self.config.max_price {
            if quote.price > max_price {
                issues.push(ValidationIssue::soft(format!(
                    "Price ({}) exceeds max threshold ({})",
                    quote.price, max_price
                )));
            }
        }

        if self.config.warn_on_zero_volume && quote.volume == Some(0) {
            issues.push(ValidationIssue::soft("Zero volume (market may be closed)"));
        }
    }

    fn check_profile(&self, profile: &CompanyProfile, issues: &mut Vec<ValidationIssue>) {
        let has_name = profile
            .name
            .as_deref()
            .map(|n| !n.trim().is_empty())
            .unwrap_or(false);
        if !has_name {
            issues.push(ValidationIssue::hard("Profile has no company name"));
        }

        if profile.market_cap.map(|m| m < 0.0).unwrap_or(false) {
            issues.push(ValidationIssue::soft("Negative market cap"));
        }
    }

    fn normalize_history(
        &self,
        mut points: Vec<PricePoint>,
        issues: &mut Vec<ValidationIssue>,
    ) -> Vec<PricePoint> {
        let before = points.len();
        points.retain(|p| p.price > Decimal::ZERO);
        if points.len() < before {
            issues.push(ValidationIssue::soft(format!(
                "Dropped {} non-positive price points",
                before - points.len()
            )));
        }

        points.sort_by_key(|p| p.timestamp);
        points.dedup_by_key(|p| p.timestamp);

        if points.is_empty() {
            issues.push(ValidationIssue::hard("History contains no usable points"));
        }
        points
    }

    fn normalize_news(
        &self,
        mut articles: Vec<NewsArticle>,
        limit: usize,
        issues: &mut Vec<ValidationIssue>,
    ) -> Vec<NewsArticle> {
        articles.retain(|a| !a.title.trim().is_empty() && !a.url.trim().is_empty());
        articles.truncate(limit);

        if articles.is_empty() {
            issues.push(ValidationIssue::hard("No news articles returned"));
        }
        articles
    }
}

impl Default for PayloadValidator {
    fn default() -> Self {
        Self::new()
    }
}
