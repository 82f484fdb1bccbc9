//! Command-line front end for the import pipeline
//!
//! ```text
//! watchlist-import <listed-stocks|historical-prices> <csv-file>...
//! ```

use anyhow::{bail, Context};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;
use watchlist_import::config::ENV_DATA_DIR;
use watchlist_import::{init_tracing, AppState, ImportService, JobType};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let mut args = std::env::args().skip(1);
    let job_type: JobType = match args.next() {
        Some(raw) => raw.parse()?,
        None => bail!("usage: watchlist-import <listed-stocks|historical-prices> <csv-file>..."),
    };
    let files: Vec<PathBuf> = args.map(PathBuf::from).collect();
    if files.is_empty() {
        bail!("no CSV files given");
    }

    let data_dir = std::env::var(ENV_DATA_DIR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"));
    let state = AppState::new(&data_dir)
        .with_context(|| format!("failed to open data directory {:?}", data_dir))?;
    state.start_worker()?;

    let mut job_ids = Vec::with_capacity(files.len());
    for path in &files {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {:?}", path))?;
        let submitted = ImportService::submit_job(&state, job_type, source_name(path), content)?;
        tracing::info!("Queued {:?} as job {}", path, submitted.id);
        job_ids.push(submitted.id);
    }

    tokio::select! {
        result = wait_for_jobs(&state, &job_ids) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, stopping imports");
        }
    }

    state.shutdown().await;

    let statuses = job_ids
        .iter()
        .map(|id| ImportService::get_job_status(&state, id))
        .collect::<watchlist_import::Result<Vec<_>>>()?;
    println!("{}", serde_json::to_string_pretty(&statuses)?);

    Ok(())
}

async fn wait_for_jobs(state: &AppState, job_ids: &[Uuid]) -> anyhow::Result<()> {
    loop {
        let mut pending = 0;
        for id in job_ids {
            if !ImportService::get_job_status(state, id)?.status.is_terminal() {
                pending += 1;
            }
        }
        if pending == 0 {
            return Ok(());
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn source_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}
