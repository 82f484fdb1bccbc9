//! Application state management

use crate::config::ImportConfig;
use crate::db::{DbStoreFactory, DuckDb, SqliteDb, StoreFactory};
use crate::error::{AppError, Result};
use crate::jobs::{ImportWorker, InMemoryJobQueue, JobQueue};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Application state shared by the submission and polling layers
pub struct AppState {
    /// Job queue and status registry
    pub queue: Arc<dyn JobQueue>,

    /// Per-job store handles
    pub stores: Arc<dyn StoreFactory>,

    /// Effective import configuration
    pub config: ImportConfig,

    /// Process-wide shutdown signal
    pub shutdown: CancellationToken,

    /// SQLite database, when running against files
    pub sqlite: Option<Arc<SqliteDb>>,

    /// DuckDB database, when running against files
    pub duckdb: Option<Arc<DuckDb>>,

    /// Application data directory, when running against files
    pub data_dir: Option<PathBuf>,

    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AppState {
    /// Create application state backed by database files in `data_dir`
    pub fn new(data_dir: &Path) -> Result<Self> {
        // Create data directory if it doesn't exist
        std::fs::create_dir_all(data_dir)?;

        tracing::info!("Data directory: {:?}", data_dir);

        // Initialize SQLite database
        let sqlite_path = data_dir.join("watchlist.db");
        let sqlite = Arc::new(SqliteDb::new(&sqlite_path)?);

        // Initialize DuckDB for historical prices
        let duckdb_path = data_dir.join("historify.duckdb");
        let duckdb = Arc::new(DuckDb::new(&duckdb_path)?);

        let config = sqlite.get_import_config()?.with_env_overrides()?;
        let stores = Arc::new(DbStoreFactory::new(&sqlite_path, duckdb.clone()));

        let mut state = Self::with_store(stores, config)?;
        state.sqlite = Some(sqlite);
        state.duckdb = Some(duckdb);
        state.data_dir = Some(data_dir.to_path_buf());
        Ok(state)
    }

    /// Create application state around any store
    pub fn with_store(stores: Arc<dyn StoreFactory>, config: ImportConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            queue: Arc::new(InMemoryJobQueue::new()),
            stores,
            config,
            shutdown: CancellationToken::new(),
            sqlite: None,
            duckdb: None,
            data_dir: None,
            worker: Mutex::new(None),
        })
    }

    /// Start the import worker. Only one worker may run per state, and
    /// never after shutdown.
    pub fn start_worker(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(AppError::Internal("Import pipeline is shut down".to_string()));
        }

        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(AppError::Internal("Import worker already started".to_string()));
        }

        let handle = ImportWorker::new(
            self.queue.clone(),
            self.stores.clone(),
            self.config.clone(),
            self.shutdown.clone(),
        )
        .start();
        *worker = Some(handle);

        tracing::info!("Import worker launched");
        Ok(())
    }

    /// Check if the worker has been started
    pub fn is_worker_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Signal shutdown and wait for the dispatch loop to exit.
    ///
    /// In-flight jobs see the same signal and stop at their next row.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("Import worker ended abnormally: {}", e);
            }
        }

        tracing::info!("Import pipeline shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_worker_lifecycle() {
        let state = AppState::with_store(Arc::new(MemoryStore::new()), ImportConfig::default()).unwrap();

        assert!(!state.is_worker_running());
        state.start_worker().unwrap();
        assert!(state.is_worker_running());
        assert!(state.start_worker().is_err());

        state.shutdown().await;
        assert!(!state.is_worker_running());
    }

    #[tokio::test]
    async fn test_no_restart_after_shutdown() {
        let state = AppState::with_store(Arc::new(MemoryStore::new()), ImportConfig::default()).unwrap();
        state.start_worker().unwrap();
        state.shutdown().await;

        assert!(matches!(state.start_worker(), Err(AppError::Internal(_))));
        assert!(!state.is_worker_running());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ImportConfig {
            batch_size: 0,
            ..ImportConfig::default()
        };
        assert!(AppState::with_store(Arc::new(MemoryStore::new()), config).is_err());
    }

    #[tokio::test]
    async fn test_file_backed_state() {
        let dir = tempdir().unwrap();
        let state = AppState::new(&dir.path().join("data")).unwrap();

        assert!(dir.path().join("data").join("watchlist.db").exists());
        assert!(state.sqlite.is_some());
        assert!(state.duckdb.is_some());
    }
}
