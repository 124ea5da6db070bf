use serde::{Deserialize, Serialize};

use super::history::PricePoint;
use super::kind::DataKind;
use super::news::NewsArticle;
use super::profile::CompanyProfile;
use super::quote::Quote;

/// Payload of any resolved request.
///
/// Keeps the cache, the store and the single-flight table free of type
/// parameters; typed access goes through `TryFrom`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MarketData {
    Quote(Quote),
    Details(CompanyProfile),
    History(Vec<PricePoint>),
    News(Vec<NewsArticle>),
}

impl MarketData {
    pub fn data_kind(&self) -> DataKind {
        match self {
            Self::Quote(_) => DataKind::Quote,
            Self::Details(_) => DataKind::Details,
            Self::History(_) => DataKind::History,
            Self::News(_) => DataKind::News,
        }
    }

    /// Representative price carried by the payload, if any.
    ///
    /// Used to seed synthetic data with the last real level seen.
    pub fn reference_price(&self) -> Option<rust_decimal::Decimal> {
        match self {
            Self::Quote(quote) => Some(quote.price),
            Self::History(points) => points.last().map(|p| p.price),
            Self::Details(_) | Self::News(_) => None,
        }
    }

    /// Representative volume carried by the payload, if any.
    pub fn reference_volume(&self) -> Option<u64> {
        match self {
            Self::Quote(quote) => quote.volume,
            Self::History(points) => points.last().map(|p| p.volume),
            Self::Details(_) | Self::News(_) => None,
        }
    }
}

impl TryFrom<MarketData> for Quote {
    type Error = MarketData;

    fn try_from(value: MarketData) -> Result<Self, Self::Error> {
        match value {
            MarketData::Quote(quote) => Ok(quote),
            other => Err(other),
        }
    }
}

impl TryFrom<MarketData> for CompanyProfile {
    type Error = MarketData;

    fn try_from(value: MarketData) -> Result<Self, Self::Error> {
        match value {
            MarketData::Details(profile) => Ok(profile),
            other => Err(other),
        }
    }
}

impl TryFrom<MarketData> for Vec<PricePoint> {
    type Error = MarketData;

    fn try_from(value: MarketData) -> Result<Self, Self::Error> {
        match value {
            MarketData::History(points) => Ok(points),
            other => Err(other),
        }
    }
}

impl TryFrom<MarketData> for Vec<NewsArticle> {
    type Error = MarketData;

    fn try_from(value: MarketData) -> Result<Self, Self::Error> {
        match value {
            MarketData::News(articles) => Ok(articles),
            other => Err(other),
        }
    }
}
