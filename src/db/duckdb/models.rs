//! DuckDB data models

use serde::{Deserialize, Serialize};

/// Stored daily bar as read back for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalPriceRow {
    pub symbol: String,
    pub date: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub source: Option<String>,
}
