//! Import dispatcher
//!
//! One long-lived task pulls jobs off the queue in submission order and hands
//! each to its own supervised task without waiting for earlier jobs. There is
//! no concurrency cap: imports are administrator-triggered and few.

use crate::config::ImportConfig;
use crate::db::StoreFactory;
use crate::error::AppError;
use crate::jobs::models::Job;
use crate::jobs::processor::process_job;
use crate::jobs::JobQueue;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Background import worker
pub struct ImportWorker {
    queue: Arc<dyn JobQueue>,
    stores: Arc<dyn StoreFactory>,
    config: ImportConfig,
    cancel: CancellationToken,
}

impl ImportWorker {
    /// Create a new worker bound to `queue` and the process-wide `cancel` token
    pub fn new(
        queue: Arc<dyn JobQueue>,
        stores: Arc<dyn StoreFactory>,
        config: ImportConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            stores,
            config,
            cancel,
        }
    }

    /// Start the dispatch loop.
    ///
    /// The returned handle finishes once `cancel` fires. Jobs already
    /// dispatched keep running and observe the same token per row.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Import worker started (batch size {})", self.config.batch_size);

            loop {
                let job = match self.queue.dequeue(&self.cancel).await {
                    Ok(job) => job,
                    Err(AppError::Cancelled) => break,
                    Err(e) => {
                        error!("Failed to read from import queue: {}", e);
                        let backoff = Duration::from_millis(self.config.queue_error_backoff_ms);
                        tokio::select! {
                            _ = self.cancel.cancelled() => break,
                            _ = tokio::time::sleep(backoff) => continue,
                        }
                    }
                };

                self.dispatch(job);
            }

            info!("Import worker stopped");
        })
    }

    /// Fire-and-forget one job under its own supervisor
    fn dispatch(&self, job: Job) {
        let queue = self.queue.clone();
        let stores = self.stores.clone();
        let config = self.config.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let job_id = job.id;
            let inner = tokio::spawn(run_job(job, queue.clone(), stores, config, cancel));

            if let Err(join_error) = inner.await {
                let message = join_error_message(join_error);
                error!("Import job {} aborted: {}", job_id, message);
                if let Err(e) = queue.mark_failed(&job_id, &message) {
                    warn!("Could not record failure for job {}: {}", job_id, e);
                }
            }
        });
    }
}

async fn run_job(
    job: Job,
    queue: Arc<dyn JobQueue>,
    stores: Arc<dyn StoreFactory>,
    config: ImportConfig,
    cancel: CancellationToken,
) {
    if let Err(e) = queue.mark_processing(&job.id) {
        error!("Cannot start import job {}: {}", job.id, e);
        return;
    }

    info!(
        "Processing import job {} ({}, source {:?})",
        job.id, job.job_type, job.source_name
    );

    let result = match stores.open_scope() {
        Ok(store) => process_job(&job, queue.as_ref(), store, &config, &cancel).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(outcome) => {
            if let Err(e) = queue.mark_completed(&job.id) {
                warn!("Could not record completion for job {}: {}", job.id, e);
                return;
            }
            info!(
                "Import job {} completed: {} of {} rows stored in {} batches, {} skipped",
                job.id,
                outcome.flushed_items,
                outcome.total_items,
                outcome.batches,
                outcome.skipped_items
            );
        }
        Err(AppError::Cancelled) => {
            let processed = queue
                .get_status(&job.id)
                .map(|s| s.processed_items)
                .unwrap_or(0);
            info!(
                "Import job {} cancelled by shutdown after {} rows",
                job.id, processed
            );
        }
        Err(e) => {
            error!("Import job {} failed: {}", job.id, e);
            if let Err(mark_err) = queue.mark_failed(&job.id, &e.to_string()) {
                warn!("Could not record failure for job {}: {}", job.id, mark_err);
            }
        }
    }
}

fn join_error_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "Import task was cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => format!("Import task panicked: {}", panic_message(payload.as_ref())),
        Err(err) => err.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ImportStore, MemoryStore};
    use crate::error::Result;
    use crate::import::{HistoricalPriceRecord, ListedStockRecord};
    use crate::jobs::{InMemoryJobQueue, JobState, JobStatus, JobType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    const LISTED_HEADER: &str =
        "Symbol,Name,Last Sale,Net Change,% Change,Market Cap,Country,IPO Year,Volume,Sector,Industry";

    fn listed_csv(symbols: &[&str]) -> String {
        let mut csv = format!("{}\n", LISTED_HEADER);
        for symbol in symbols {
            csv.push_str(&format!(
                "{},{} Corp,$12.50,0.25,2.04%,\"1,500,000\",United States,1999,\"10,000\",Finance,Banks\n",
                symbol, symbol
            ));
        }
        csv
    }

    /// Store whose every write fails
    struct BrokenStore;

    #[async_trait]
    impl ImportStore for BrokenStore {
        async fn bulk_upsert_listed_stocks(&self, _records: Vec<ListedStockRecord>) -> Result<usize> {
            Err(AppError::Persistence("database is locked".to_string()))
        }

        async fn upsert_historical_prices_many(
            &self,
            _records: Vec<HistoricalPriceRecord>,
        ) -> Result<usize> {
            Err(AppError::Persistence("database is locked".to_string()))
        }
    }

    impl StoreFactory for BrokenStore {
        fn open_scope(&self) -> Result<Arc<dyn ImportStore>> {
            Ok(Arc::new(BrokenStore))
        }
    }

    /// Store that panics while writing
    struct PanickingStore;

    #[async_trait]
    impl ImportStore for PanickingStore {
        async fn bulk_upsert_listed_stocks(&self, _records: Vec<ListedStockRecord>) -> Result<usize> {
            panic!("driver exploded");
        }

        async fn upsert_historical_prices_many(
            &self,
            _records: Vec<HistoricalPriceRecord>,
        ) -> Result<usize> {
            panic!("driver exploded");
        }
    }

    impl StoreFactory for PanickingStore {
        fn open_scope(&self) -> Result<Arc<dyn ImportStore>> {
            Ok(Arc::new(PanickingStore))
        }
    }

    /// Queue whose first reads fail before delegating
    struct FlakyQueue {
        inner: InMemoryJobQueue,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl JobQueue for FlakyQueue {
        fn enqueue(&self, job: Job) -> Result<JobStatus> {
            self.inner.enqueue(job)
        }

        async fn dequeue(&self, cancel: &CancellationToken) -> Result<Job> {
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(AppError::Internal("channel poisoned".to_string()));
            }
            self.inner.dequeue(cancel).await
        }

        fn get_status(&self, id: &Uuid) -> Option<JobStatus> {
            self.inner.get_status(id)
        }

        fn list_all(&self) -> Vec<JobStatus> {
            self.inner.list_all()
        }

        fn mark_processing(&self, id: &Uuid) -> Result<()> {
            self.inner.mark_processing(id)
        }

        fn set_total_items(&self, id: &Uuid, total: u64) -> Result<()> {
            self.inner.set_total_items(id, total)
        }

        fn add_processed_items(&self, id: &Uuid, count: u64) -> Result<u64> {
            self.inner.add_processed_items(id, count)
        }

        fn mark_completed(&self, id: &Uuid) -> Result<()> {
            self.inner.mark_completed(id)
        }

        fn mark_failed(&self, id: &Uuid, error: &str) -> Result<()> {
            self.inner.mark_failed(id, error)
        }
    }

    /// Memory store that fires shutdown while writing its Nth batch
    struct ShutdownOnFlush {
        inner: MemoryStore,
        cancel: CancellationToken,
        trigger_at: usize,
    }

    #[async_trait]
    impl ImportStore for ShutdownOnFlush {
        async fn bulk_upsert_listed_stocks(&self, records: Vec<ListedStockRecord>) -> Result<usize> {
            let written = self.inner.bulk_upsert_listed_stocks(records).await?;
            if self.inner.flush_sizes().len() == self.trigger_at {
                self.cancel.cancel();
            }
            Ok(written)
        }

        async fn upsert_historical_prices_many(
            &self,
            records: Vec<HistoricalPriceRecord>,
        ) -> Result<usize> {
            self.inner.upsert_historical_prices_many(records).await
        }
    }

    impl StoreFactory for ShutdownOnFlush {
        fn open_scope(&self) -> Result<Arc<dyn ImportStore>> {
            Ok(Arc::new(ShutdownOnFlush {
                inner: self.inner.clone(),
                cancel: self.cancel.clone(),
                trigger_at: self.trigger_at,
            }))
        }
    }

    fn start(
        stores: Arc<dyn StoreFactory>,
        batch_size: usize,
    ) -> (Arc<InMemoryJobQueue>, CancellationToken, JoinHandle<()>) {
        let queue = Arc::new(InMemoryJobQueue::new());
        let cancel = CancellationToken::new();
        let config = ImportConfig {
            batch_size,
            ..ImportConfig::default()
        };
        let handle = ImportWorker::new(queue.clone(), stores, config, cancel.clone()).start();
        (queue, cancel, handle)
    }

    async fn wait_terminal(queue: &InMemoryJobQueue, id: &Uuid) -> JobStatus {
        for _ in 0..500 {
            if let Some(status) = queue.get_status(id) {
                if status.status.is_terminal() {
                    return status;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} did not finish", id);
    }

    #[tokio::test]
    async fn test_job_completes() {
        let store = Arc::new(MemoryStore::new());
        let (queue, cancel, handle) = start(store.clone(), 2);

        let job = Job::new(JobType::ListedStocksCsv, None, listed_csv(&["AAPL", "MSFT", "NVDA"]));
        let id = queue.enqueue(job).unwrap().id;

        let status = wait_terminal(&queue, &id).await;
        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.total_items, Some(3));
        assert_eq!(status.processed_items, 3);
        assert!(status.started_at.is_some());
        assert!(status.completed_at.is_some());
        assert!(status.error.is_none());
        assert_eq!(store.listed_stock_count(), 3);
        assert_eq!(store.listed_stock("NVDA").unwrap().name, "NVDA Corp");
        assert_eq!(store.flush_sizes(), vec![2, 1]);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_persistence_failure_fails_job() {
        let (queue, cancel, handle) = start(Arc::new(BrokenStore), 500);

        let job = Job::new(JobType::ListedStocksCsv, None, listed_csv(&["AAPL"]));
        let id = queue.enqueue(job).unwrap().id;

        let status = wait_terminal(&queue, &id).await;
        assert_eq!(status.status, JobState::Failed);
        assert_eq!(status.processed_items, 0);
        assert!(status.error.unwrap().contains("database is locked"));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_panic_is_contained_to_its_job() {
        let (queue, cancel, handle) = start(Arc::new(PanickingStore), 500);

        let job = Job::new(JobType::ListedStocksCsv, None, listed_csv(&["AAPL"]));
        let id = queue.enqueue(job).unwrap().id;

        let status = wait_terminal(&queue, &id).await;
        assert_eq!(status.status, JobState::Failed);
        assert!(status.error.unwrap().contains("driver exploded"));

        // Dispatcher is still alive
        let next = Job::new(JobType::ListedStocksCsv, None, "Symbol,Name\n");
        let next_id = queue.enqueue(next).unwrap().id;
        let next_status = wait_terminal(&queue, &next_id).await;
        assert_eq!(next_status.status, JobState::Completed);
        assert_eq!(next_status.total_items, Some(0));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_jobs_progress_independently() {
        let store = Arc::new(MemoryStore::new());
        let (queue, cancel, handle) = start(store.clone(), 3);

        let mut ids = Vec::new();
        for n in 1..=8usize {
            let symbols: Vec<String> = (0..n).map(|i| format!("J{}S{}", n, i)).collect();
            let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
            let job = Job::new(JobType::ListedStocksCsv, Some(format!("batch-{}.csv", n)), listed_csv(&refs));
            ids.push((n as u64, queue.enqueue(job).unwrap().id));
        }

        for (expected, id) in &ids {
            let status = wait_terminal(&queue, id).await;
            assert_eq!(status.status, JobState::Completed);
            assert_eq!(status.total_items, Some(*expected));
            assert_eq!(status.processed_items, *expected);
        }

        assert_eq!(queue.list_all().len(), 8);
        assert_eq!(store.listed_stock_count(), (1..=8).sum::<usize>());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_reimport_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let (queue, cancel, handle) = start(store.clone(), 500);
        let csv = listed_csv(&["AAPL", "MSFT"]);

        for _ in 0..2 {
            let id = queue
                .enqueue(Job::new(JobType::ListedStocksCsv, None, csv.clone()))
                .unwrap()
                .id;
            assert_eq!(wait_terminal(&queue, &id).await.status, JobState::Completed);
        }

        assert_eq!(store.listed_stock_count(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_historical_job_uses_source_symbol() {
        let store = Arc::new(MemoryStore::new());
        let (queue, cancel, handle) = start(store.clone(), 500);

        let csv = "Date,Close/Last,Volume,Open,High,Low\n\
                   03/07/2024,$169.00,71765060,$169.15,$170.73,$168.49\n\
                   03/06/2024,$169.12,68587710,$171.06,$171.24,$168.68\n\
                   garbage\n";
        let job = Job::new(JobType::HistoricalPricesCsv, Some("AAPL.csv".to_string()), csv);
        let id = queue.enqueue(job).unwrap().id;

        let status = wait_terminal(&queue, &id).await;
        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.total_items, Some(3));
        assert_eq!(status.processed_items, 2);
        assert_eq!(store.historical_price_count(), 2);
        assert_eq!(store.historical_prices_for("AAPL").len(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_queue_read_error_does_not_stop_dispatcher() {
        let queue = Arc::new(FlakyQueue {
            inner: InMemoryJobQueue::new(),
            failures_left: AtomicUsize::new(2),
        });
        let cancel = CancellationToken::new();
        let config = ImportConfig {
            batch_size: 500,
            queue_error_backoff_ms: 5,
        };
        let store = Arc::new(MemoryStore::new());
        let handle = ImportWorker::new(queue.clone(), store.clone(), config, cancel.clone()).start();

        let job = Job::new(JobType::ListedStocksCsv, None, listed_csv(&["AAPL", "MSFT"]));
        let id = queue.enqueue(job).unwrap().id;

        let status = wait_terminal(&queue.inner, &id).await;
        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.processed_items, 2);
        assert_eq!(queue.failures_left.load(Ordering::SeqCst), 0);
        assert!(!handle.is_finished());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_mid_job_keeps_flushed_progress() {
        let cancel = CancellationToken::new();
        let memory = MemoryStore::new();
        let stores = Arc::new(ShutdownOnFlush {
            inner: memory.clone(),
            cancel: cancel.clone(),
            trigger_at: 2,
        });
        let queue = Arc::new(InMemoryJobQueue::new());
        let config = ImportConfig {
            batch_size: 2,
            ..ImportConfig::default()
        };
        let handle = ImportWorker::new(queue.clone(), stores, config, cancel.clone()).start();

        let job = Job::new(
            JobType::ListedStocksCsv,
            None,
            listed_csv(&["A", "B", "C", "D", "E", "F", "G"]),
        );
        let id = queue.enqueue(job).unwrap().id;

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
        // Let the in-flight job observe the signal
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = queue.get_status(&id).unwrap();
        assert_eq!(status.status, JobState::Processing);
        assert!(status.error.is_none());
        assert!(status.completed_at.is_none());
        assert_eq!(status.total_items, Some(7));
        assert_eq!(memory.flush_sizes(), vec![2, 2]);
        assert_eq!(status.processed_items, 4);
        assert_eq!(memory.listed_stock_count(), 4);
    }

    #[tokio::test]
    async fn test_worker_stops_on_cancel() {
        let (_queue, cancel, handle) = start(Arc::new(MemoryStore::new()), 500);
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }

    #[test]
    fn test_panic_message_extraction() {
        let static_payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(static_payload.as_ref()), "static str");

        let owned_payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned_payload.as_ref()), "owned");

        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
