//! Batched upsert coordinator
//!
//! One pipeline serves every import kind. A [`RowSchema`] supplies the header
//! token, the minimum column count and the row mapping; the caller supplies the
//! flush function that hands a full batch to the persistence collaborator.

use crate::error::{AppError, Result};
use crate::import::csv::{parse_line, CsvPayload};
use crate::import::records::RowContext;
use crate::jobs::JobQueue;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default number of records per flush
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Shape of one CSV import kind
pub struct RowSchema<R> {
    /// Case-insensitive prefix identifying a header line
    pub header_token: &'static str,
    /// Rows with fewer fields are skipped without mapping
    pub min_columns: usize,
    /// Fields -> record
    pub map_row: fn(&[String], &RowContext) -> Result<R>,
}

/// Counters for a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub total_items: u64,
    pub flushed_items: u64,
    pub skipped_items: u64,
    pub batches: u64,
}

/// Drives one job's rows through parse, map, buffer and flush
pub struct BatchPipeline<'a> {
    queue: &'a dyn JobQueue,
    job_id: Uuid,
    batch_size: usize,
    cancel: &'a CancellationToken,
}

impl<'a> BatchPipeline<'a> {
    pub fn new(
        queue: &'a dyn JobQueue,
        job_id: Uuid,
        batch_size: usize,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            queue,
            job_id,
            batch_size: batch_size.max(1),
            cancel,
        }
    }

    /// Run every data row of `content` through `schema`, flushing full
    /// batches with `flush` and recording progress on the queue.
    ///
    /// Bad rows are logged and skipped. Flush errors abort the run. Returns
    /// `AppError::Cancelled` if the token fires; batches flushed before that
    /// stay flushed.
    pub async fn run<R, F, Fut>(
        &self,
        content: &str,
        schema: &RowSchema<R>,
        ctx: &RowContext,
        mut flush: F,
    ) -> Result<BatchOutcome>
    where
        F: FnMut(Vec<R>) -> Fut,
        Fut: Future<Output = Result<usize>>,
    {
        let payload = CsvPayload::parse(content, schema.header_token);
        let mut outcome = BatchOutcome {
            total_items: payload.total_items(),
            ..BatchOutcome::default()
        };

        self.queue.set_total_items(&self.job_id, outcome.total_items)?;
        info!(
            "Job {}: {} data rows (header present: {})",
            self.job_id, outcome.total_items, payload.has_header
        );

        let mut buffer: Vec<R> = Vec::with_capacity(self.batch_size);

        for (index, line) in payload.rows.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            // 1-based row number in the data section
            let row = index + 1;
            let fields = parse_line(line);

            if fields.len() < schema.min_columns {
                warn!(
                    "Job {}: skipping row {} with {} of {} columns: {}",
                    self.job_id,
                    row,
                    fields.len(),
                    schema.min_columns,
                    line
                );
                outcome.skipped_items += 1;
                continue;
            }

            match (schema.map_row)(&fields, ctx) {
                Ok(record) => buffer.push(record),
                Err(e) => {
                    warn!("Job {}: skipping row {} ({}): {}", self.job_id, row, e, line);
                    outcome.skipped_items += 1;
                    continue;
                }
            }

            if buffer.len() >= self.batch_size {
                let batch = std::mem::replace(&mut buffer, Vec::with_capacity(self.batch_size));
                self.flush_batch(batch, &mut flush, &mut outcome).await?;
            }
        }

        if !buffer.is_empty() {
            if self.cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }
            self.flush_batch(buffer, &mut flush, &mut outcome).await?;
        }

        Ok(outcome)
    }

    async fn flush_batch<R, F, Fut>(
        &self,
        batch: Vec<R>,
        flush: &mut F,
        outcome: &mut BatchOutcome,
    ) -> Result<()>
    where
        F: FnMut(Vec<R>) -> Fut,
        Fut: Future<Output = Result<usize>>,
    {
        let size = batch.len() as u64;
        let upserted = flush(batch).await?;

        let processed = self.queue.add_processed_items(&self.job_id, size)?;
        outcome.flushed_items += size;
        outcome.batches += 1;

        debug!(
            "Job {}: flushed batch {} ({} records, {} upserted), {}/{} processed",
            self.job_id, outcome.batches, size, upserted, processed, outcome.total_items
        );
        Ok(())
    }
}
