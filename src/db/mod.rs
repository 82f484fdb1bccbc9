//! Persistence collaborators for the import pipeline
//!
//! - `sqlite` - listed stocks and import settings
//! - `duckdb` - historical price series
//! - `memory` - process-local store with the same keying
//!
//! Every upsert here is idempotent: listed stocks are keyed by symbol,
//! price bars by (symbol, date). The pipeline relies on that and does no
//! deduplication of its own.

pub mod duckdb;
pub mod memory;
pub mod sqlite;

use crate::error::{AppError, Result};
use crate::import::{HistoricalPriceRecord, ListedStockRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use self::duckdb::DuckDb;
pub use memory::MemoryStore;
pub use sqlite::SqliteDb;

/// Bulk write target for parsed records
#[async_trait]
pub trait ImportStore: Send + Sync {
    /// Insert-or-replace listed stocks keyed by symbol
    async fn bulk_upsert_listed_stocks(&self, records: Vec<ListedStockRecord>) -> Result<usize>;

    /// Insert-or-replace price bars keyed by (symbol, date)
    async fn upsert_historical_prices_many(
        &self,
        records: Vec<HistoricalPriceRecord>,
    ) -> Result<usize>;
}

/// Hands each job its own store handle
pub trait StoreFactory: Send + Sync {
    fn open_scope(&self) -> Result<Arc<dyn ImportStore>>;
}

/// Store backed by the SQLite and DuckDB files.
///
/// Connections are opened on first use, on the blocking pool, so a job only
/// touches the database its records go to.
pub struct DbStore {
    sqlite_path: PathBuf,
    sqlite: Arc<Mutex<Option<Arc<SqliteDb>>>>,
    duckdb_root: Arc<DuckDb>,
    duckdb: Arc<Mutex<Option<Arc<DuckDb>>>>,
}

impl DbStore {
    /// `sqlite_path` must already be migrated; `duckdb_root` is the root connection
    pub fn new(sqlite_path: &Path, duckdb_root: Arc<DuckDb>) -> Self {
        Self {
            sqlite_path: sqlite_path.to_path_buf(),
            sqlite: Arc::new(Mutex::new(None)),
            duckdb_root,
            duckdb: Arc::new(Mutex::new(None)),
        }
    }
}

/// Return the handle in `slot`, opening it first if needed
fn scoped<T>(slot: &Mutex<Option<Arc<T>>>, open: impl FnOnce() -> Result<T>) -> Result<Arc<T>> {
    let mut guard = slot.lock();
    if let Some(handle) = guard.as_ref() {
        return Ok(handle.clone());
    }
    let handle = Arc::new(open()?);
    *guard = Some(handle.clone());
    Ok(handle)
}

#[async_trait]
impl ImportStore for DbStore {
    async fn bulk_upsert_listed_stocks(&self, records: Vec<ListedStockRecord>) -> Result<usize> {
        let slot = self.sqlite.clone();
        let path = self.sqlite_path.clone();
        tokio::task::spawn_blocking(move || {
            let sqlite = scoped(&slot, || SqliteDb::connect(&path))?;
            sqlite.bulk_upsert_listed_stocks(&records)
        })
        .await
        .map_err(|e| AppError::Persistence(format!("SQLite writer task failed: {}", e)))?
    }

    async fn upsert_historical_prices_many(
        &self,
        records: Vec<HistoricalPriceRecord>,
    ) -> Result<usize> {
        let slot = self.duckdb.clone();
        let root = self.duckdb_root.clone();
        tokio::task::spawn_blocking(move || {
            let duckdb = scoped(&slot, || root.try_clone())?;
            duckdb.upsert_historical_prices_many(&records)
        })
        .await
        .map_err(|e| AppError::Persistence(format!("DuckDB writer task failed: {}", e)))?
    }
}

/// Hands each job its own lazily connected `DbStore`
pub struct DbStoreFactory {
    sqlite_path: PathBuf,
    duckdb: Arc<DuckDb>,
}

impl DbStoreFactory {
    /// `sqlite_path` must already be migrated; `duckdb` is the root connection
    pub fn new(sqlite_path: &Path, duckdb: Arc<DuckDb>) -> Self {
        Self {
            sqlite_path: sqlite_path.to_path_buf(),
            duckdb,
        }
    }
}

impl StoreFactory for DbStoreFactory {
    fn open_scope(&self) -> Result<Arc<dyn ImportStore>> {
        Ok(Arc::new(DbStore::new(&self.sqlite_path, self.duckdb.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn stock(symbol: &str) -> ListedStockRecord {
        ListedStockRecord {
            symbol: symbol.to_string(),
            name: format!("{} Holdings", symbol),
            last_sale: 10.0,
            net_change: 0.1,
            percent_change: 1.0,
            market_cap: 5_000_000.0,
            country: Some("Canada".to_string()),
            ipo_year: Some(2015),
            volume: 1234,
            sector: None,
            industry: None,
            updated_at: Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap(),
        }
    }

    fn bar(symbol: &str, day: u32) -> HistoricalPriceRecord {
        HistoricalPriceRecord {
            symbol: symbol.to_string(),
            date: Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 100,
            source: None,
        }
    }

    #[tokio::test]
    async fn test_scoped_stores_write_to_shared_files() {
        let dir = tempdir().unwrap();
        let sqlite_path = dir.path().join("watchlist.db");
        let sqlite = Arc::new(SqliteDb::new(&sqlite_path).unwrap());
        let duckdb = Arc::new(DuckDb::new(&dir.path().join("historify.duckdb")).unwrap());

        let factory = DbStoreFactory::new(&sqlite_path, duckdb.clone());
        let first = factory.open_scope().unwrap();
        let second = factory.open_scope().unwrap();

        first
            .bulk_upsert_listed_stocks(vec![stock("SHOP"), stock("RY")])
            .await
            .unwrap();
        second.bulk_upsert_listed_stocks(vec![stock("SHOP")]).await.unwrap();
        second
            .upsert_historical_prices_many(vec![bar("SHOP", 3), bar("SHOP", 4)])
            .await
            .unwrap();
        first
            .upsert_historical_prices_many(vec![bar("SHOP", 4)])
            .await
            .unwrap();

        assert_eq!(sqlite.count_listed_stocks().unwrap(), 2);
        assert_eq!(duckdb.count_historical_prices().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_price_scope_never_opens_sqlite() {
        let dir = tempdir().unwrap();
        let duckdb = Arc::new(DuckDb::new(&dir.path().join("historify.duckdb")).unwrap());

        // SQLite path cannot be opened, so only a listed-stock write may fail
        let missing = dir.path().join("missing").join("watchlist.db");
        let scope = DbStoreFactory::new(&missing, duckdb.clone()).open_scope().unwrap();

        assert_eq!(
            scope
                .upsert_historical_prices_many(vec![bar("MSFT", 5), bar("MSFT", 6)])
                .await
                .unwrap(),
            2
        );
        assert!(scope.bulk_upsert_listed_stocks(vec![stock("SHOP")]).await.is_err());
        assert!(!missing.exists());
        assert_eq!(duckdb.count_historical_prices().unwrap(), 2);
    }
}
