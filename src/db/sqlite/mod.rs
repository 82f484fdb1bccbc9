//! SQLite database module
//!
//! Holds the listed-stock table and the import settings row.

mod listed_stocks;
mod migrations;
mod settings;

use crate::config::ImportConfig;
use crate::error::Result;
use crate::import::ListedStockRecord;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// Wait this long for another connection's write lock before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite database wrapper
pub struct SqliteDb {
    conn: Mutex<Connection>,
}

impl SqliteDb {
    /// Open the database file and run migrations
    pub fn new(path: &Path) -> Result<Self> {
        let db = Self::connect(path)?;

        // Run migrations
        db.run_migrations()?;

        Ok(db)
    }

    /// Open another connection to an already migrated database file
    pub fn connect(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, migrated
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }

    // ========== Listed Stock Methods ==========

    /// Insert-or-replace listed stocks keyed by symbol
    pub fn bulk_upsert_listed_stocks(&self, records: &[ListedStockRecord]) -> Result<usize> {
        let mut conn = self.conn.lock();
        listed_stocks::bulk_upsert(&mut conn, records)
    }

    /// Number of stored listed stocks
    pub fn count_listed_stocks(&self) -> Result<i64> {
        let conn = self.conn.lock();
        listed_stocks::count(&conn)
    }

    /// Get one listed stock
    pub fn get_listed_stock(&self, symbol: &str) -> Result<Option<ListedStockRecord>> {
        let conn = self.conn.lock();
        listed_stocks::get_by_symbol(&conn, symbol)
    }

    // ========== Settings Methods ==========

    /// Get import configuration
    pub fn get_import_config(&self) -> Result<ImportConfig> {
        let conn = self.conn.lock();
        settings::get_import_config(&conn)
    }

    /// Update import configuration
    pub fn update_import_config(
        &self,
        batch_size: Option<usize>,
        queue_error_backoff_ms: Option<u64>,
    ) -> Result<ImportConfig> {
        let conn = self.conn.lock();
        settings::update_import_config(&conn, batch_size, queue_error_backoff_ms)
    }
}
