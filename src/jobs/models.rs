//! Job and job status models

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Kind of bulk import carried by a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobType {
    /// Listed-company metadata (one row per symbol)
    ListedStocksCsv,
    /// Daily OHLCV series (one row per symbol and date)
    HistoricalPricesCsv,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobType::ListedStocksCsv => write!(f, "listed-stocks"),
            JobType::HistoricalPricesCsv => write!(f, "historical-prices"),
        }
    }
}

impl FromStr for JobType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "listed-stocks" | "listedstockscsv" | "listed" => Ok(JobType::ListedStocksCsv),
            "historical-prices" | "historicalpricescsv" | "historical" => {
                Ok(JobType::HistoricalPricesCsv)
            }
            other => Err(AppError::Validation(format!("Unknown job type: {}", other))),
        }
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    /// Completed and Failed accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Processing)
                | (JobState::Processing, JobState::Completed)
                | (JobState::Processing, JobState::Failed)
        )
    }
}

/// A submitted unit of import work. Never mutated after creation.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub source_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub content: String,
}

impl Job {
    /// Create a new job with a fresh id
    pub fn new(job_type: JobType, source_name: Option<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_type,
            source_name,
            created_at: Utc::now(),
            content: content.into(),
        }
    }
}

/// Pollable progress record for a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub id: Uuid,
    pub status: JobState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_items: Option<u64>,
    pub processed_items: u64,
    pub error: Option<String>,
}

impl JobStatus {
    /// Initial status registered at enqueue time
    pub fn queued(job: &Job) -> Self {
        Self {
            id: job.id,
            status: JobState::Queued,
            created_at: job.created_at,
            started_at: None,
            completed_at: None,
            total_items: None,
            processed_items: 0,
            error: None,
        }
    }
}
