use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Latest trading snapshot for a symbol
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    /// Ticker symbol
    pub symbol: String,

    /// Current/last price (required)
    pub price: Decimal,

    /// Absolute change against previous close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<Decimal>,

    /// Percent change against previous close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<Decimal>,

    /// Session open
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<Decimal>,

    /// Session high
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<Decimal>,

    /// Session low
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<Decimal>,

    /// Previous session close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<Decimal>,

    /// Traded volume
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,

    /// Time of the quote
    pub timestamp: DateTime<Utc>,

    /// Source of the quote (FINNHUB, SYNTHETIC, etc.)
    pub source: String,
}

impl Quote {
    /// Create a new quote with minimal required fields
    pub fn new(symbol: impl Into<String>, price: Decimal, source: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            change: None,
            change_percent: None,
            open: None,
            high: None,
            low: None,
            previous_close: None,
            volume: None,
            timestamp: Utc::now(),
            source: source.into(),
        }
    }

    /// Set session open/high/low
    pub fn with_range(mut self, open: Decimal, high: Decimal, low: Decimal) -> Self {
        self.open = Some(open);
        self.high = Some(high);
        self.low = Some(low);
        self
    }

    /// Set volume
    pub fn with_volume(mut self, volume: u64) -> Self {
        self.volume = Some(volume);
        self
    }

    /// Set previous close and derive change fields from it
    pub fn with_previous_close(mut self, previous_close: Decimal) -> Self {
        self.previous_close = Some(previous_close);
        if !previous_close.is_zero() {
            let change = self.price - previous_close;
            self.change = Some(change);
            self.change_percent = Some((change / previous_close * Decimal::ONE_HUNDRED).round_dp(4));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_quote_new() {
        let quote = Quote::new("AAPL", dec!(150.25), "FINNHUB");
        assert_eq!(quote.price, dec!(150.25));
        assert_eq!(quote.symbol, "AAPL");
        assert!(quote.open.is_none());
        assert!(quote.change.is_none());
    }

    #[test]
    fn test_previous_close_derives_change() {
        let quote = Quote::new("AAPL", dec!(110), "FINNHUB").with_previous_close(dec!(100));
        assert_eq!(quote.change, Some(dec!(10)));
        assert_eq!(quote.change_percent, Some(dec!(10)));
    }

    #[test]
    fn test_quote_serialization_skips_missing_fields() {
        let quote = Quote::new("AAPL", dec!(1), "FINNHUB").with_volume(10);
        let json = serde_json::to_string(&quote).unwrap();
        assert!(json.contains("\"volume\":10"));
        assert!(!json.contains("changePercent"));
    }
}
