//! Parsed import records and row mapping
//!
//! Listed-stock rows follow the exchange screener export:
//! `Symbol,Name,Last Sale,Net Change,% Change,Market Cap,Country,IPO Year,Volume,Sector,Industry`
//!
//! Historical rows follow the exchange price-history export:
//! `Date,Close/Last,Volume,Open,High,Low[,Symbol]`
//! The symbol column is optional; without it the symbol comes from the job's
//! source name (`AAPL.csv` -> `AAPL`).

use crate::error::{AppError, Result};
use crate::import::convert::{
    parse_date, parse_decimal, parse_long, parse_optional_int, parse_optional_string,
    parse_percentage,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Listed-company metadata, keyed by symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedStockRecord {
    pub symbol: String,
    pub name: String,
    pub last_sale: f64,
    pub net_change: f64,
    pub percent_change: f64,
    pub market_cap: f64,
    pub country: Option<String>,
    pub ipo_year: Option<i32>,
    pub volume: i64,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One daily OHLCV bar, keyed by (symbol, date)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalPriceRecord {
    pub symbol: String,
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub source: Option<String>,
}

/// Per-job values every row mapping may need
#[derive(Debug, Clone)]
pub struct RowContext {
    pub source_name: Option<String>,
    pub default_symbol: Option<String>,
    pub imported_at: DateTime<Utc>,
}

impl RowContext {
    pub fn new(source_name: Option<String>, imported_at: DateTime<Utc>) -> Self {
        let default_symbol = source_name.as_deref().and_then(symbol_from_source_name);
        Self {
            source_name,
            default_symbol,
            imported_at,
        }
    }
}

/// Derive a ticker from a source name such as `aapl.csv` or `data/MSFT_history.csv`
pub fn symbol_from_source_name(source_name: &str) -> Option<String> {
    let file_name = source_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(source_name);
    let stem = file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name);
    let ticker: String = stem
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '^')
        .collect();

    if ticker.is_empty() {
        None
    } else {
        Some(ticker.to_ascii_uppercase())
    }
}

pub const LISTED_STOCK_HEADER: &str = "Symbol,";
pub const LISTED_STOCK_MIN_COLUMNS: usize = 11;

pub const HISTORICAL_PRICE_HEADER: &str = "Date,";
pub const HISTORICAL_PRICE_MIN_COLUMNS: usize = 6;

/// Build a listed-stock record from tokenized fields
pub fn map_listed_stock(fields: &[String], ctx: &RowContext) -> Result<ListedStockRecord> {
    if fields.len() < LISTED_STOCK_MIN_COLUMNS {
        return Err(AppError::Validation(format!(
            "Expected {} columns, found {}",
            LISTED_STOCK_MIN_COLUMNS,
            fields.len()
        )));
    }

    let symbol = fields[0].trim().to_ascii_uppercase();
    if symbol.is_empty() {
        return Err(AppError::Validation("Missing symbol".to_string()));
    }

    Ok(ListedStockRecord {
        symbol,
        name: fields[1].trim().to_string(),
        last_sale: parse_decimal(&fields[2]),
        net_change: parse_decimal(&fields[3]),
        percent_change: parse_percentage(&fields[4]),
        market_cap: parse_decimal(&fields[5]),
        country: parse_optional_string(&fields[6]),
        ipo_year: parse_optional_int(&fields[7]),
        volume: parse_long(&fields[8]),
        sector: parse_optional_string(&fields[9]),
        industry: parse_optional_string(&fields[10]),
        updated_at: ctx.imported_at,
    })
}

/// Build a historical price record from tokenized fields
pub fn map_historical_price(fields: &[String], ctx: &RowContext) -> Result<HistoricalPriceRecord> {
    if fields.len() < HISTORICAL_PRICE_MIN_COLUMNS {
        return Err(AppError::Validation(format!(
            "Expected {} columns, found {}",
            HISTORICAL_PRICE_MIN_COLUMNS,
            fields.len()
        )));
    }

    let date = parse_date(&fields[0])
        .ok_or_else(|| AppError::Validation(format!("Invalid date: {}", fields[0].trim())))?;

    let symbol = fields
        .get(6)
        .and_then(|s| parse_optional_string(s))
        .map(|s| s.to_ascii_uppercase())
        .or_else(|| ctx.default_symbol.clone())
        .ok_or_else(|| AppError::Validation("No symbol column and no source name".to_string()))?;

    Ok(HistoricalPriceRecord {
        symbol,
        date,
        close: parse_decimal(&fields[1]),
        volume: parse_long(&fields[2]),
        open: parse_decimal(&fields[3]),
        high: parse_decimal(&fields[4]),
        low: parse_decimal(&fields[5]),
        source: ctx.source_name.clone(),
    })
}
