//! Import Service
//!
//! Accepts CSV imports and reports their progress.

use crate::error::{AppError, Result};
use crate::jobs::{Job, JobStatus, JobType};
use crate::state::AppState;
use tracing::info;
use uuid::Uuid;

/// Import service for business logic
pub struct ImportService;

impl ImportService {
    /// Queue an import and return immediately with its `Queued` status
    pub fn submit_job(
        state: &AppState,
        job_type: JobType,
        source_name: Option<String>,
        content: String,
    ) -> Result<JobStatus> {
        if content.trim().is_empty() {
            return Err(AppError::Validation("Import content is empty".to_string()));
        }

        let job = Job::new(job_type, source_name, content);
        info!(
            "ImportService::submit_job - id={}, type={}, source={:?}",
            job.id, job.job_type, job.source_name
        );

        state.queue.enqueue(job)
    }

    /// Current status snapshot for one job
    pub fn get_job_status(state: &AppState, job_id: &Uuid) -> Result<JobStatus> {
        state
            .queue
            .get_status(job_id)
            .ok_or_else(|| AppError::NotFound(format!("Import job not found: {}", job_id)))
    }

    /// Every known job, oldest first
    pub fn list_job_statuses(state: &AppState) -> Vec<JobStatus> {
        let mut statuses = state.queue.list_all();
        statuses.sort_by_key(|status| status.created_at);
        statuses
    }
}
