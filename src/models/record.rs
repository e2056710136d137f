//! Persisted file records keyed by the derived file id.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row of the file metadata table.
///
/// The pipeline writes the enrichment columns; the descriptive columns
/// (`file_name`, `content_type`, `author_name`, `expiration_date`, `s3_bucket`)
/// are filled by an upload and never touched by the pipeline.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq)]
pub struct FileRecord {
    /// Basename of the object key without its extension.
    pub file_id: String,

    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub author_name: Option<String>,

    /// `YYYY-MM-DD`
    pub expiration_date: Option<String>,

    /// Size in bytes as reported by the object head.
    pub file_size: Option<i64>,

    /// Number of pages; null for anything that is not a PDF.
    pub page_count: Option<i64>,

    /// Leading text of the document, empty when nothing was extracted.
    pub extracted_text: String,

    /// Completion marker, set once every field has been written.
    pub lambda_processed: bool,

    /// Bucket the payload was uploaded to, when known.
    pub s3_bucket: Option<String>,

    /// Decoded object key the record was derived from.
    pub s3_key: Option<String>,

    pub created_at: Option<DateTime<Utc>>,

    /// Bumped on every write.
    pub updated_at: Option<DateTime<Utc>>,
}

/// The field set merged into a record on every successful invocation.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct FileRecordUpdate {
    pub file_size: i64,
    pub page_count: Option<i64>,
    pub extracted_text: String,
    pub lambda_processed: bool,
    pub s3_key: String,
}

/// A record registered at upload time, before any enrichment has run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewFileRecord {
    pub file_name: String,
    pub content_type: String,
    pub author_name: String,
    pub expiration_date: Option<NaiveDate>,
    pub file_size: i64,
    pub s3_bucket: String,
    pub s3_key: String,
}

/// A record as returned by the lookup endpoint.
#[derive(Serialize, Debug)]
pub struct FileRecordView {
    #[serde(flatten)]
    pub record: FileRecord,

    /// Where the payload can be fetched from the object store, when the
    /// record knows its bucket and key.
    pub file_url: Option<String>,
}

impl FileRecordView {
    pub fn new(record: FileRecord, object_store_url: &str) -> Self {
        let file_url = match (&record.s3_bucket, &record.s3_key) {
            (Some(bucket), Some(key)) => Some(object_url(object_store_url, bucket, key)),
            _ => None,
        };
        Self { record, file_url }
    }
}

/// `{base}/{bucket}/{key}` with each path segment percent-encoded.
pub fn object_url(base: &str, bucket: &str, key: &str) -> String {
    let encoded_key = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/");
    format!(
        "{}/{}/{}",
        base.trim_end_matches('/'),
        urlencoding::encode(bucket),
        encoded_key
    )
}
