//! Import configuration
//!
//! Stored values live in the SQLite `import_settings` row; environment
//! variables override them for a single process.

use crate::error::{AppError, Result};
use crate::import::DEFAULT_BATCH_SIZE;
use serde::{Deserialize, Serialize};

pub const ENV_DATA_DIR: &str = "WATCHLIST_DATA_DIR";
pub const ENV_BATCH_SIZE: &str = "WATCHLIST_IMPORT_BATCH_SIZE";
pub const ENV_BACKOFF_MS: &str = "WATCHLIST_IMPORT_BACKOFF_MS";

/// Tunables for the import worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Records per persistence call
    pub batch_size: usize,
    /// Pause after a failed queue read
    pub queue_error_backoff_ms: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            queue_error_backoff_ms: 1000,
        }
    }
}

impl ImportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(AppError::Validation("batch_size must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_BATCH_SIZE) {
            self.batch_size = raw
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid {}: {} ({})", ENV_BATCH_SIZE, raw, e)))?;
        }
        if let Some(raw) = lookup(ENV_BACKOFF_MS) {
            self.queue_error_backoff_ms = raw
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid {}: {} ({})", ENV_BACKOFF_MS, raw, e)))?;
        }

        self.validate()?;
        Ok(self)
    }
}
