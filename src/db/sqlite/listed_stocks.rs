//! Listed stock storage
//!
//! Rows are keyed by symbol; writing the same symbol again replaces it.

use crate::error::Result;
use crate::import::ListedStockRecord;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Insert-or-replace a batch of listed stocks in one transaction
pub fn bulk_upsert(conn: &mut Connection, records: &[ListedStockRecord]) -> Result<usize> {
    let tx = conn.transaction()?;

    let mut stmt = tx.prepare(
        "INSERT INTO listed_stocks (symbol, name, last_sale, net_change, percent_change, market_cap,
                                    country, ipo_year, volume, sector, industry, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(symbol) DO UPDATE SET
           name = excluded.name, last_sale = excluded.last_sale, net_change = excluded.net_change,
           percent_change = excluded.percent_change, market_cap = excluded.market_cap,
           country = excluded.country, ipo_year = excluded.ipo_year, volume = excluded.volume,
           sector = excluded.sector, industry = excluded.industry, updated_at = excluded.updated_at",
    )?;

    let mut count = 0;
    for record in records {
        count += stmt.execute(params![
            record.symbol,
            record.name,
            record.last_sale,
            record.net_change,
            record.percent_change,
            record.market_cap,
            record.country,
            record.ipo_year,
            record.volume,
            record.sector,
            record.industry,
            record.updated_at.to_rfc3339(),
        ])?;
    }

    drop(stmt);
    tx.commit()?;

    tracing::debug!("Upserted {} listed stocks", count);
    Ok(count)
}

/// Number of stored listed stocks
pub fn count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM listed_stocks", [], |row| row.get(0))?;
    Ok(count)
}

/// Look up one listed stock by symbol
pub fn get_by_symbol(conn: &Connection, symbol: &str) -> Result<Option<ListedStockRecord>> {
    let record = conn
        .query_row(
            "SELECT symbol, name, last_sale, net_change, percent_change, market_cap,
                    country, ipo_year, volume, sector, industry, updated_at
             FROM listed_stocks WHERE symbol = ?1",
            params![symbol],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<ListedStockRecord> {
    let updated_at: String = row.get(11)?;
    let updated_at = DateTime::parse_from_rfc3339(&updated_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(ListedStockRecord {
        symbol: row.get(0)?,
        name: row.get(1)?,
        last_sale: row.get(2)?,
        net_change: row.get(3)?,
        percent_change: row.get(4)?,
        market_cap: row.get(5)?,
        country: row.get(6)?,
        ipo_year: row.get(7)?,
        volume: row.get(8)?,
        sector: row.get(9)?,
        industry: row.get(10)?,
        updated_at,
    })
}
