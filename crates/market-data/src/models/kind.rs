use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::symbol::Symbol;
use crate::errors::MarketDataError;

/// Capability tag: the kind of data a provider can serve, without parameters.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataKind {
    Quote,
    Details,
    History,
    News,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quote => write!(f, "Quote"),
            Self::Details => write!(f, "Details"),
            Self::History => write!(f, "History"),
            Self::News => write!(f, "News"),
        }
    }
}

/// Chart range for a price history request.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "1w")]
    OneWeek,
    #[serde(rename = "1m")]
    OneMonth,
    #[serde(rename = "3m")]
    ThreeMonths,
    #[serde(rename = "6m")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
}

impl Interval {
    pub const ALL: [Interval; 6] = [
        Self::OneDay,
        Self::OneWeek,
        Self::OneMonth,
        Self::ThreeMonths,
        Self::SixMonths,
        Self::OneYear,
    ];

    /// Number of points a full series for this range contains.
    ///
    /// One point per minute of a 6.5h session for a day, hourly for a week,
    /// daily otherwise, with a year counted in trading days.
    pub fn bucket_count(self) -> usize {
        match self {
            Self::OneDay => 390,
            Self::OneWeek => 168,
            Self::OneMonth => 30,
            Self::ThreeMonths => 90,
            Self::SixMonths => 180,
            Self::OneYear => 252,
        }
    }

    /// Spacing between consecutive points.
    pub fn step(self) -> Duration {
        match self {
            Self::OneDay => Duration::minutes(1),
            Self::OneWeek => Duration::hours(1),
            _ => Duration::days(1),
        }
    }

    /// Total span covered by a full series.
    pub fn span(self) -> Duration {
        self.step() * self.bucket_count() as i32
    }

    /// Candle resolution understood by most REST providers ("1", "60", "D").
    pub fn resolution(self) -> &'static str {
        match self {
            Self::OneDay => "1",
            Self::OneWeek => "60",
            _ => "D",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneDay => "1d",
            Self::OneWeek => "1w",
            Self::OneMonth => "1m",
            Self::ThreeMonths => "3m",
            Self::SixMonths => "6m",
            Self::OneYear => "1y",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1d" => Ok(Self::OneDay),
            "1w" => Ok(Self::OneWeek),
            "1m" => Ok(Self::OneMonth),
            "3m" => Ok(Self::ThreeMonths),
            "6m" => Ok(Self::SixMonths),
            "1y" => Ok(Self::OneYear),
            other => Err(MarketDataError::UnsupportedKind(format!(
                "Unsupported history interval '{}'",
                other
            ))),
        }
    }
}

/// What a caller asks for, including the parameters of the kind.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "param", rename_all = "snake_case")]
pub enum RequestKind {
    Quote,
    Details,
    History(Interval),
    News(u32),
}

impl RequestKind {
    /// The capability a provider must declare to serve this request.
    pub fn data_kind(&self) -> DataKind {
        match self {
            Self::Quote => DataKind::Quote,
            Self::Details => DataKind::Details,
            Self::History(_) => DataKind::History,
            Self::News(_) => DataKind::News,
        }
    }

    /// Check the kind's parameters against the allowed ranges.
    pub fn validate(&self, max_news_limit: u32) -> Result<(), MarketDataError> {
        match self {
            Self::News(limit) if *limit == 0 || *limit > max_news_limit => {
                Err(MarketDataError::UnsupportedKind(format!(
                    "News limit {} outside 1..={}",
                    limit, max_news_limit
                )))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quote => write!(f, "Quote"),
            Self::Details => write!(f, "Details"),
            Self::History(interval) => write!(f, "History({})", interval),
            Self::News(limit) => write!(f, "News({})", limit),
        }
    }
}

/// Cache and single-flight key.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct RequestKey {
    pub symbol: Symbol,
    pub kind: RequestKind,
}

impl RequestKey {
    pub fn new(symbol: Symbol, kind: RequestKind) -> Self {
        Self { symbol, kind }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.symbol, self.kind)
    }
}
