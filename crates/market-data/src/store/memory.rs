use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use log::debug;
use tokio::sync::RwLock;

use super::{MarketDataStore, StoredRecord};
use crate::errors::MarketDataError;
use crate::models::RequestKey;

/// Process-local [`MarketDataStore`].
///
/// Used when no durable backend is configured, and in tests. Counts reads
/// and writes so callers can assert how often the tier was consulted.
#[derive(Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<RequestKey, StoredRecord>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a record in place without counting it as a write.
    pub async fn insert(&self, key: RequestKey, record: StoredRecord) {
        self.records.write().await.insert(key, record);
    }

    /// Make every subsequent operation fail with [`MarketDataError::Store`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn check_available(&self) -> Result<(), MarketDataError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MarketDataError::Store("in-memory store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MarketDataStore for InMemoryStore {
    async fn get(&self, key: &RequestKey) -> Result<Option<StoredRecord>, MarketDataError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn save(&self, key: &RequestKey, record: StoredRecord) -> Result<(), MarketDataError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        debug!("Storing {} (updated {})", key, record.last_updated);
        self.records.write().await.insert(key.clone(), record);
        Ok(())
    }
}
