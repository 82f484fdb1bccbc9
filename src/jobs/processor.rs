//! Per-job processing
//!
//! Picks the row schema and flush target for a job's type and runs the batch
//! pipeline. Status bookkeeping around the run belongs to the worker.

use crate::config::ImportConfig;
use crate::db::ImportStore;
use crate::error::Result;
use crate::import::records::{
    map_historical_price, map_listed_stock, HISTORICAL_PRICE_HEADER,
    HISTORICAL_PRICE_MIN_COLUMNS, LISTED_STOCK_HEADER, LISTED_STOCK_MIN_COLUMNS,
};
use crate::import::{BatchOutcome, BatchPipeline, RowContext, RowSchema};
use crate::jobs::models::{Job, JobType};
use crate::jobs::JobQueue;
use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Run one job's content into `store`
pub async fn process_job(
    job: &Job,
    queue: &dyn JobQueue,
    store: Arc<dyn ImportStore>,
    config: &ImportConfig,
    cancel: &CancellationToken,
) -> Result<BatchOutcome> {
    let ctx = RowContext::new(job.source_name.clone(), Utc::now());
    let pipeline = BatchPipeline::new(queue, job.id, config.batch_size, cancel);

    match job.job_type {
        JobType::ListedStocksCsv => {
            let schema = RowSchema {
                header_token: LISTED_STOCK_HEADER,
                min_columns: LISTED_STOCK_MIN_COLUMNS,
                map_row: map_listed_stock,
            };
            pipeline
                .run(&job.content, &schema, &ctx, |batch| {
                    let store = store.clone();
                    async move { store.bulk_upsert_listed_stocks(batch).await }
                })
                .await
        }
        JobType::HistoricalPricesCsv => {
            let schema = RowSchema {
                header_token: HISTORICAL_PRICE_HEADER,
                min_columns: HISTORICAL_PRICE_MIN_COLUMNS,
                map_row: map_historical_price,
            };
            pipeline
                .run(&job.content, &schema, &ctx, |batch| {
                    let store = store.clone();
                    async move { store.upsert_historical_prices_many(batch).await }
                })
                .await
        }
    }
}
