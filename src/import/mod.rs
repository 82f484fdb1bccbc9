//! CSV import building blocks
//!
//! - `csv` - quote-aware line tokenizer and payload normalization
//! - `convert` - total field converters
//! - `records` - parsed record types and row mapping per import kind
//! - `pipeline` - generic batched upsert coordinator

pub mod convert;
pub mod csv;
pub mod pipeline;
pub mod records;

pub use csv::{parse_line, CsvPayload};
pub use pipeline::{BatchOutcome, BatchPipeline, RowSchema, DEFAULT_BATCH_SIZE};
pub use records::{HistoricalPriceRecord, ListedStockRecord, RowContext};
