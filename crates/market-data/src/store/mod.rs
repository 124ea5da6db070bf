//! Persistent second-tier store.
//!
//! The store is slower and more durable than the in-memory cache. The
//! resolver consults it on a cache miss and writes every real provider
//! result back to it in the background. Synthetic data never reaches it.
//!
//! "Fresh enough" is decided by the caller; the store only hands back the
//! record with its timestamp.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::errors::MarketDataError;
use crate::models::{MarketData, Quote, RequestKey, RequestKind, Symbol};

/// A stored payload and when it was last refreshed.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredRecord {
    pub value: MarketData,
    pub last_updated: DateTime<Utc>,
}

impl StoredRecord {
    /// Record stamped with the current time.
    pub fn new(value: MarketData) -> Self {
        Self {
            value,
            last_updated: Utc::now(),
        }
    }

    pub fn with_timestamp(value: MarketData, last_updated: DateTime<Utc>) -> Self {
        Self {
            value,
            last_updated,
        }
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.last_updated
    }

    /// Whether the record is no older than `max_age`.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.age() <= max_age
    }
}

/// Storage interface for resolved market data.
///
/// Implementations handle the actual persistence. Errors are reported as
/// [`MarketDataError::Store`]; the resolver treats them as a miss.
#[async_trait]
pub trait MarketDataStore: Send + Sync {
    /// Gets the record stored for a key, regardless of its age.
    async fn get(&self, key: &RequestKey) -> Result<Option<StoredRecord>, MarketDataError>;

    /// Saves a record, replacing any previous one for the key.
    async fn save(&self, key: &RequestKey, record: StoredRecord) -> Result<(), MarketDataError>;

    /// Latest stored quotes for the given symbols.
    ///
    /// Symbols without a stored quote are omitted. The order of `symbols`
    /// is preserved.
    async fn latest_quotes(&self, symbols: &[Symbol]) -> Result<Vec<Quote>, MarketDataError> {
        let mut quotes = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let key = RequestKey::new(symbol.clone(), RequestKind::Quote);
            if let Some(StoredRecord {
                value: MarketData::Quote(quote),
                ..
            }) = self.get(&key).await?
            {
                quotes.push(quote);
            }
        }
        Ok(quotes)
    }
}
