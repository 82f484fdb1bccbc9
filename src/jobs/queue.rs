//! In-memory import job queue
//!
//! Many producers enqueue, exactly one consumer dequeues. The status map is
//! shared with pollers and with every in-flight worker, so it lives in a
//! sharded `DashMap` rather than behind one lock.

use crate::error::{AppError, Result};
use crate::jobs::models::{Job, JobState, JobStatus};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Queue contract shared by the submission side, the dispatcher and workers.
///
/// Progress mutation is part of the contract so workers never need to know
/// which implementation they are talking to.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Register the job's `Queued` status, then publish the job
    fn enqueue(&self, job: Job) -> Result<JobStatus>;

    /// Wait for the next job in submission order.
    ///
    /// Returns `AppError::Cancelled` once `cancel` fires.
    async fn dequeue(&self, cancel: &CancellationToken) -> Result<Job>;

    /// Snapshot of one job's status
    fn get_status(&self, id: &Uuid) -> Option<JobStatus>;

    /// Snapshot of every known status
    fn list_all(&self) -> Vec<JobStatus>;

    /// Queued -> Processing, stamping `started_at`
    fn mark_processing(&self, id: &Uuid) -> Result<()>;

    /// Fix the number of data rows. Can only be set once.
    fn set_total_items(&self, id: &Uuid, total: u64) -> Result<()>;

    /// Add a flushed batch to the processed count, returning the new count
    fn add_processed_items(&self, id: &Uuid, count: u64) -> Result<u64>;

    /// Processing -> Completed
    fn mark_completed(&self, id: &Uuid) -> Result<()>;

    /// Processing -> Failed with the captured message
    fn mark_failed(&self, id: &Uuid, error: &str) -> Result<()>;
}

/// Process-lifetime queue backed by an unbounded channel
pub struct InMemoryJobQueue {
    sender: mpsc::UnboundedSender<Job>,
    receiver: Mutex<mpsc::UnboundedReceiver<Job>>,
    statuses: DashMap<Uuid, JobStatus>,
}

impl InMemoryJobQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            statuses: DashMap::new(),
        }
    }

    fn transition(&self, id: &Uuid, next: JobState, error: Option<&str>) -> Result<()> {
        let mut entry = self
            .statuses
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;

        if !entry.status.can_transition_to(next) {
            return Err(AppError::Internal(format!(
                "Illegal status transition for job {}: {:?} -> {:?}",
                id, entry.status, next
            )));
        }

        let now = Utc::now();
        match next {
            JobState::Processing => entry.started_at = Some(now),
            JobState::Completed | JobState::Failed => entry.completed_at = Some(now),
            JobState::Queued => {}
        }
        entry.status = next;
        entry.error = error.map(str::to_string);
        Ok(())
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    fn enqueue(&self, job: Job) -> Result<JobStatus> {
        let status = JobStatus::queued(&job);
        let id = job.id;

        // Status must be visible before the consumer can see the job
        self.statuses.insert(id, status.clone());

        if self.sender.send(job).is_err() {
            self.statuses.remove(&id);
            return Err(AppError::QueueClosed);
        }

        tracing::debug!("Enqueued import job {}", id);
        Ok(status)
    }

    async fn dequeue(&self, cancel: &CancellationToken) -> Result<Job> {
        let mut receiver = tokio::select! {
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
            guard = self.receiver.lock() => guard,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            job = receiver.recv() => job.ok_or(AppError::QueueClosed),
        }
    }

    fn get_status(&self, id: &Uuid) -> Option<JobStatus> {
        self.statuses.get(id).map(|entry| entry.clone())
    }

    fn list_all(&self) -> Vec<JobStatus> {
        self.statuses.iter().map(|entry| entry.value().clone()).collect()
    }

    fn mark_processing(&self, id: &Uuid) -> Result<()> {
        self.transition(id, JobState::Processing, None)
    }

    fn set_total_items(&self, id: &Uuid, total: u64) -> Result<()> {
        let mut entry = self
            .statuses
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;

        if entry.total_items.is_some() {
            return Err(AppError::Internal(format!(
                "Total items already set for job {}",
                id
            )));
        }

        entry.total_items = Some(total);
        entry.processed_items = entry.processed_items.min(total);
        Ok(())
    }

    fn add_processed_items(&self, id: &Uuid, count: u64) -> Result<u64> {
        let mut entry = self
            .statuses
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;

        let mut processed = entry.processed_items.saturating_add(count);
        if let Some(total) = entry.total_items {
            processed = processed.min(total);
        }
        entry.processed_items = processed;
        Ok(processed)
    }

    fn mark_completed(&self, id: &Uuid) -> Result<()> {
        self.transition(id, JobState::Completed, None)
    }

    fn mark_failed(&self, id: &Uuid, error: &str) -> Result<()> {
        self.transition(id, JobState::Failed, Some(error))
    }
}
