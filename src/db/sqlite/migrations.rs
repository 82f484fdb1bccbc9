//! SQLite database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    // Create migrations table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, "001_listed_stocks", CREATE_LISTED_STOCKS_TABLE)?;
    run_migration(conn, "002_import_settings", CREATE_IMPORT_SETTINGS_TABLE)?;

    tracing::info!("Database migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    // Check if migration already applied
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

const CREATE_LISTED_STOCKS_TABLE: &str = r#"
CREATE TABLE listed_stocks (
    symbol TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    last_sale REAL NOT NULL DEFAULT 0,
    net_change REAL NOT NULL DEFAULT 0,
    percent_change REAL NOT NULL DEFAULT 0,
    market_cap REAL NOT NULL DEFAULT 0,
    country TEXT,
    ipo_year INTEGER,
    volume INTEGER NOT NULL DEFAULT 0,
    sector TEXT,
    industry TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX idx_listed_stocks_sector ON listed_stocks(sector);
"#;

const CREATE_IMPORT_SETTINGS_TABLE: &str = r#"
CREATE TABLE import_settings (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    batch_size INTEGER NOT NULL DEFAULT 500,
    queue_error_backoff_ms INTEGER NOT NULL DEFAULT 1000,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

INSERT INTO import_settings (id) VALUES (1);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 2);

        let settings_rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM import_settings", [], |row| row.get(0))
            .unwrap();
        assert_eq!(settings_rows, 1);
    }
}
