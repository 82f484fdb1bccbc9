//! Stock Watchlist - Bulk CSV Import
//!
//! Background pipeline that turns uploaded CSV files into listed-stock and
//! historical-price records. Submission returns at once with a job id; a
//! single dispatcher hands each job to its own supervised task, which
//! streams rows in batches into idempotent upserts and reports progress.

pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod jobs;
pub mod services;
pub mod state;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use config::ImportConfig;
pub use error::{AppError, Result};
pub use jobs::{Job, JobState, JobStatus, JobType};
pub use services::ImportService;
pub use state::AppState;

/// Initialize tracing/logging. Repeated calls keep the first subscriber.
pub fn init_tracing() {
    let initialized = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watchlist_import=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if initialized.is_ok() {
        tracing::info!("Starting Stock Watchlist import pipeline...");
    }
}
