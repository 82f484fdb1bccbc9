//! DuckDB database module for historical price series

pub mod models;
mod migrations;

use crate::error::Result;
use crate::import::HistoricalPriceRecord;
use duckdb::Connection;
use models::HistoricalPriceRow;
use parking_lot::Mutex;
use std::path::Path;

/// Timestamp literal layout DuckDB casts implicitly into TIMESTAMP
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// DuckDB database wrapper
pub struct DuckDb {
    conn: Mutex<Connection>,
}

impl DuckDb {
    /// Create new DuckDB connection
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// In-memory database, migrated
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };

        // Run migrations
        db.run_migrations()?;

        Ok(db)
    }

    /// Another connection to the same database for a separate unit of work
    pub fn try_clone(&self) -> Result<Self> {
        let conn = self.conn.lock().try_clone()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }

    /// Insert-or-replace price bars keyed by (symbol, date)
    pub fn upsert_historical_prices_many(&self, records: &[HistoricalPriceRecord]) -> Result<usize> {
        let mut conn = self.conn.lock();

        let tx = conn.transaction()?;

        let mut stmt = tx.prepare(
            "INSERT INTO historical_prices (symbol, trade_date, open, high, low, close, volume, source)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (symbol, trade_date) DO UPDATE SET
               open = excluded.open, high = excluded.high, low = excluded.low,
               close = excluded.close, volume = excluded.volume, source = excluded.source",
        )?;

        let mut count = 0;
        for record in records {
            stmt.execute(duckdb::params![
                record.symbol,
                record.date.format(TIMESTAMP_FORMAT).to_string(),
                record.open,
                record.high,
                record.low,
                record.close,
                record.volume,
                record.source,
            ])?;
            count += 1;
        }

        drop(stmt);
        tx.commit()?;

        tracing::debug!("Upserted {} historical prices", count);
        Ok(count)
    }

    /// Number of stored price bars
    pub fn count_historical_prices(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM historical_prices", [], |row| row.get(0))?;
        Ok(count)
    }

    /// All bars for one symbol, oldest first
    pub fn query_historical_prices(&self, symbol: &str) -> Result<Vec<HistoricalPriceRow>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT symbol, CAST(trade_date AS VARCHAR), open, high, low, close, volume, source
             FROM historical_prices
             WHERE symbol = ?
             ORDER BY trade_date ASC",
        )?;

        let rows = stmt
            .query_map(duckdb::params![symbol], |row| {
                Ok(HistoricalPriceRow {
                    symbol: row.get(0)?,
                    date: row.get(1)?,
                    open: row.get(2)?,
                    high: row.get(3)?,
                    low: row.get(4)?,
                    close: row.get(5)?,
                    volume: row.get(6)?,
                    source: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}
