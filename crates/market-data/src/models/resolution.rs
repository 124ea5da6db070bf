use std::fmt;

use serde::Serialize;

use super::payload::MarketData;
use super::types::ProviderId;

/// Where a resolved value came from.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(tag = "origin", content = "provider", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Origin {
    /// In-memory TTL cache
    Cache,
    /// Persistent store
    Store,
    /// A live provider call
    Provider(ProviderId),
    /// Generated locally because nothing real was obtainable
    Synthetic,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cache => write!(f, "Cache"),
            Self::Store => write!(f, "Store"),
            Self::Provider(id) => write!(f, "Provider({})", id),
            Self::Synthetic => write!(f, "Synthetic"),
        }
    }
}

/// Terminal answer for one request.
///
/// Every caller attached to the same in-flight resolution receives a clone
/// of the same value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution<T = MarketData> {
    pub value: T,
    #[serde(flatten)]
    pub origin: Origin,
    pub is_stale: bool,
}

impl<T> Resolution<T> {
    pub fn new(value: T, origin: Origin, is_stale: bool) -> Self {
        Self {
            value,
            origin,
            is_stale,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.origin == Origin::Synthetic
    }

    /// Transform the value, keeping origin and staleness.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolution<U> {
        Resolution {
            value: f(self.value),
            origin: self.origin,
            is_stale: self.is_stale,
        }
    }
}
