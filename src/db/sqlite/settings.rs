//! Import settings management

use crate::config::ImportConfig;
use crate::error::{AppError, Result};
use rusqlite::Connection;

/// Get import settings
pub fn get_import_config(conn: &Connection) -> Result<ImportConfig> {
    let config = conn.query_row(
        "SELECT batch_size, queue_error_backoff_ms FROM import_settings WHERE id = 1",
        [],
        |row| {
            Ok(ImportConfig {
                batch_size: row.get::<_, i64>(0)?.max(1) as usize,
                queue_error_backoff_ms: row.get::<_, i64>(1)?.max(0) as u64,
            })
        },
    )?;

    Ok(config)
}

/// Update import settings
pub fn update_import_config(
    conn: &Connection,
    batch_size: Option<usize>,
    queue_error_backoff_ms: Option<u64>,
) -> Result<ImportConfig> {
    let mut updates = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(size) = batch_size {
        if size == 0 {
            return Err(AppError::Validation("batch_size must be at least 1".to_string()));
        }
        updates.push("batch_size = ?");
        params.push(Box::new(size as i64));
    }
    if let Some(backoff) = queue_error_backoff_ms {
        updates.push("queue_error_backoff_ms = ?");
        params.push(Box::new(backoff as i64));
    }

    if !updates.is_empty() {
        updates.push("updated_at = datetime('now')");

        let sql = format!(
            "UPDATE import_settings SET {} WHERE id = 1",
            updates.join(", ")
        );

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        conn.execute(&sql, params_refs.as_slice())?;
    }

    get_import_config(conn)
}
