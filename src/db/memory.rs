//! Process-local import store
//!
//! Keyed exactly like the database tables, so repeated imports overwrite
//! instead of duplicating. Also records the size of every flush it receives.

use crate::db::{ImportStore, StoreFactory};
use crate::error::Result;
use crate::import::{HistoricalPriceRecord, ListedStockRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct MemoryInner {
    listed_stocks: DashMap<String, ListedStockRecord>,
    historical_prices: DashMap<(String, DateTime<Utc>), HistoricalPriceRecord>,
    flushes: Mutex<Vec<usize>>,
}

/// Cheap-to-clone handle to shared in-memory tables
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listed_stock_count(&self) -> usize {
        self.inner.listed_stocks.len()
    }

    pub fn listed_stock(&self, symbol: &str) -> Option<ListedStockRecord> {
        self.inner.listed_stocks.get(symbol).map(|r| r.clone())
    }

    pub fn historical_price_count(&self) -> usize {
        self.inner.historical_prices.len()
    }

    /// Bars for one symbol, oldest first
    pub fn historical_prices_for(&self, symbol: &str) -> Vec<HistoricalPriceRecord> {
        let mut bars: Vec<HistoricalPriceRecord> = self
            .inner
            .historical_prices
            .iter()
            .filter(|entry| entry.key().0 == symbol)
            .map(|entry| entry.value().clone())
            .collect();
        bars.sort_by_key(|bar| bar.date);
        bars
    }

    /// Size of every batch received, in arrival order
    pub fn flush_sizes(&self) -> Vec<usize> {
        self.inner.flushes.lock().clone()
    }
}

#[async_trait]
impl ImportStore for MemoryStore {
    async fn bulk_upsert_listed_stocks(&self, records: Vec<ListedStockRecord>) -> Result<usize> {
        let count = records.len();
        for record in records {
            self.inner.listed_stocks.insert(record.symbol.clone(), record);
        }
        self.inner.flushes.lock().push(count);
        Ok(count)
    }

    async fn upsert_historical_prices_many(
        &self,
        records: Vec<HistoricalPriceRecord>,
    ) -> Result<usize> {
        let count = records.len();
        for record in records {
            self.inner
                .historical_prices
                .insert((record.symbol.clone(), record.date), record);
        }
        self.inner.flushes.lock().push(count);
        Ok(count)
    }
}

impl StoreFactory for MemoryStore {
    fn open_scope(&self) -> Result<Arc<dyn ImportStore>> {
        Ok(Arc::new(self.clone()))
    }
}
