//! SQLite pool setup and schema creation.

use crate::services::record_store::SqliteRecordStore;
use anyhow::{Context, Result};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::path::Path;

/// Object catalogue schema, shared with the object store.
const CATALOGUE_SQL: &str = include_str!("../migrations/0001_init.sql");

/// Open a pool for `db_url`, creating the database file's parent directory
/// and the file itself when they are missing.
pub async fn connect(db_url: &str) -> Result<SqlitePool> {
    let db_path = sqlite_file_path(db_url);
    tracing::debug!("Interpreted SQLite path => {}", db_path);

    if !db_path.starts_with(":memory:") {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating database directory {:?}", parent))?;
                tracing::info!("Created missing directory {:?}", parent);
            }
        }
        if let Err(e) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            tracing::warn!("Failed to open database file {}: {}", db_path, e);
        }
    }

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(db_url)
        .await
        .with_context(|| format!("connecting to {}", db_url))
}

/// Filesystem path named by a SQLite URL, without scheme or `?` options.
fn sqlite_file_path(db_url: &str) -> &str {
    let path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    path.split_once('?').map_or(path, |(path, _)| path)
}

/// Split a SQL script into its non-empty statements.
fn statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| {
            s.lines()
                .any(|line| !line.trim().is_empty() && !line.trim_start().starts_with("--"))
        })
        .collect()
}

/// Create the object catalogue and the record table.
pub async fn run_migrations(db: &SqlitePool, records: &SqliteRecordStore) -> Result<()> {
    let statements = statements(CATALOGUE_SQL);
    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    records
        .ensure_table()
        .await
        .with_context(|| format!("creating record table {}", records.table()))?;
    Ok(())
}
