//! src/services/record_store.rs
//!
//! File records in a SQLite table whose name comes from configuration. Writes
//! are merge-upserts: only the enrichment columns are set, every other column
//! of an existing row is left as it was.

use crate::models::record::{FileRecord, FileRecordUpdate, NewFileRecord};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordStoreError {
    #[error("table name `{0}` is not a valid identifier")]
    InvalidTableName(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RecordResult<T> = Result<T, RecordStoreError>;

/// Persistence for file records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create the record if missing, otherwise merge `update` into it.
    async fn upsert(&self, file_id: &str, update: &FileRecordUpdate) -> RecordResult<()>;

    /// Register a new record holding upload-time fields only.
    async fn create(&self, file_id: &str, record: &NewFileRecord) -> RecordResult<()>;

    async fn get(&self, file_id: &str) -> RecordResult<Option<FileRecord>>;
}

/// [`RecordStore`] over a SQLite table.
#[derive(Clone)]
pub struct SqliteRecordStore {
    db: Arc<SqlitePool>,
    table: String,
}

const MAX_TABLE_NAME_LEN: usize = 64;

/// True if `name` can be spliced into SQL as a bare identifier.
pub fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= MAX_TABLE_NAME_LEN && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl SqliteRecordStore {
    pub fn new(db: Arc<SqlitePool>, table: impl Into<String>) -> RecordResult<Self> {
        let table = table.into();
        if !is_valid_table_name(&table) {
            return Err(RecordStoreError::InvalidTableName(table));
        }
        Ok(Self { db, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the record table if it does not exist yet.
    pub async fn ensure_table(&self) -> RecordResult<()> {
        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS "{table}" (
                file_id TEXT PRIMARY KEY,
                file_name TEXT,
                content_type TEXT,
                author_name TEXT,
                expiration_date TEXT,
                file_size INTEGER,
                page_count INTEGER,
                extracted_text TEXT NOT NULL DEFAULT '',
                lambda_processed INTEGER NOT NULL DEFAULT 0,
                s3_bucket TEXT,
                s3_key TEXT,
                created_at TEXT,
                updated_at TEXT
            )
            "#,
            table = self.table
        );
        sqlx::query(&sql).execute(&*self.db).await?;
        tracing::debug!("ensured record table {}", self.table);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn upsert(&self, file_id: &str, update: &FileRecordUpdate) -> RecordResult<()> {
        let sql = format!(
            r#"
            INSERT INTO "{table}" (
                file_id, file_size, page_count, extracted_text,
                lambda_processed, s3_key, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_id) DO UPDATE SET
                file_size = excluded.file_size,
                page_count = excluded.page_count,
                extracted_text = excluded.extracted_text,
                lambda_processed = excluded.lambda_processed,
                s3_key = excluded.s3_key,
                updated_at = excluded.updated_at
            "#,
            table = self.table
        );

        let now = Utc::now();
        sqlx::query(&sql)
            .bind(file_id)
            .bind(update.file_size)
            .bind(update.page_count)
            .bind(&update.extracted_text)
            .bind(update.lambda_processed)
            .bind(&update.s3_key)
            .bind(now)
            .bind(now)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn create(&self, file_id: &str, record: &NewFileRecord) -> RecordResult<()> {
        let sql = format!(
            r#"
            INSERT INTO "{table}" (
                file_id, file_name, content_type, author_name, expiration_date,
                file_size, page_count, extracted_text, lambda_processed,
                s3_bucket, s3_key, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, NULL, '', 0, ?, ?, ?, ?)
            "#,
            table = self.table
        );

        let now = Utc::now();
        sqlx::query(&sql)
            .bind(file_id)
            .bind(&record.file_name)
            .bind(&record.content_type)
            .bind(&record.author_name)
            .bind(record.expiration_date.map(|d| d.format("%Y-%m-%d").to_string()))
            .bind(record.file_size)
            .bind(&record.s3_bucket)
            .bind(&record.s3_key)
            .bind(now)
            .bind(now)
            .execute(&*self.db)
            .await?;
        Ok(())
    }

    async fn get(&self, file_id: &str) -> RecordResult<Option<FileRecord>> {
        let sql = format!(
            r#"
            SELECT file_id, file_name, content_type, author_name, expiration_date,
                   file_size, page_count, extracted_text, lambda_processed,
                   s3_bucket, s3_key, created_at, updated_at
            FROM "{table}" WHERE file_id = ?
            "#,
            table = self.table
        );
        let record = sqlx::query_as::<_, FileRecord>(&sql)
            .bind(file_id)
            .fetch_optional(&*self.db)
            .await?;
        Ok(record)
    }
}
