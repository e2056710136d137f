//! src/services/pipeline.rs
//!
//! The enrichment pipeline: one notification in, one record upsert out.
//!
//! decode key -> head -> (PDF only: download, parse, truncate) -> derive file id -> upsert
//!
//! Every collaborator failure aborts the invocation. Nothing is written to the
//! record store unless all fields were computed.

use crate::{
    models::{notification::Notification, record::FileRecordUpdate},
    services::{
        object_storage::{ObjectStorage, StorageError},
        pdf_parser::{ExtractionError, PdfContent, PdfParser},
        record_store::{RecordStore, RecordStoreError},
    },
};
use futures::StreamExt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

/// Maximum number of characters of extracted text kept on a record.
pub const MAX_EXTRACTED_CHARS: usize = 10_000;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("notification carries no records")]
    InvalidNotification,
    #[error("invalid object key `{0}`")]
    InvalidKey(String),
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("object storage unavailable: {0}")]
    StorageUnavailable(#[source] StorageError),
    #[error("content extraction failed: {0}")]
    ExtractionFailed(#[from] ExtractionError),
    #[error("record store unavailable: {0}")]
    RecordStoreUnavailable(#[from] RecordStoreError),
}

impl PipelineError {
    fn from_storage(err: StorageError, key: &str) -> Self {
        match err {
            StorageError::ObjectNotFound { bucket, key } => Self::ObjectNotFound { bucket, key },
            StorageError::InvalidObjectKey => Self::InvalidKey(key.to_string()),
            other => Self::StorageUnavailable(other),
        }
    }
}

/// Content types the pipeline knows how to enrich.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    Pdf,
    Other,
}

impl ContentKind {
    /// Exact, case-sensitive match on the MIME type.
    pub fn from_content_type(content_type: &str) -> Self {
        match content_type {
            PDF_CONTENT_TYPE => Self::Pdf,
            _ => Self::Other,
        }
    }
}

/// Outcome of a successful invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Processed {
    pub file_id: String,
    pub update: FileRecordUpdate,
}

/// True if some `%` is not followed by two hex digits.
fn has_malformed_escape(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        match bytes.get(i + 1..i + 3) {
            Some(pair) if pair.iter().all(u8::is_ascii_hexdigit) => i += 3,
            _ => return true,
        }
    }
    false
}

/// Decode a notification key: `+` means space, the rest is percent-encoded UTF-8.
///
/// A stray `%` makes the whole key invalid rather than being kept literally.
pub fn decode_key(raw: &str) -> Result<String, PipelineError> {
    if has_malformed_escape(raw) {
        return Err(PipelineError::InvalidKey(raw.to_string()));
    }
    let spaced = raw.replace('+', " ");
    let decoded = urlencoding::decode(&spaced)
        .map_err(|_| PipelineError::InvalidKey(raw.to_string()))?
        .into_owned();
    if decoded.is_empty() {
        return Err(PipelineError::InvalidKey(raw.to_string()));
    }
    Ok(decoded)
}

/// Record id for a key: the last path segment up to its first `.`.
///
/// Keys that share a basename map to the same record. A key ending in `/`
/// yields an empty id.
pub fn derive_file_id(key: &str) -> &str {
    let basename = key.rsplit('/').next().unwrap_or(key);
    basename.split('.').next().unwrap_or(basename)
}

/// First [`MAX_EXTRACTED_CHARS`] characters of `text`.
pub fn truncate_text(mut text: String) -> String {
    if let Some((idx, _)) = text.char_indices().nth(MAX_EXTRACTED_CHARS) {
        text.truncate(idx);
    }
    text
}

/// The enrichment pipeline with its collaborators.
///
/// Built once at startup and shared; holds no per-invocation state.
#[derive(Clone)]
pub struct Pipeline {
    storage: Arc<dyn ObjectStorage>,
    parser: Arc<dyn PdfParser>,
    records: Arc<dyn RecordStore>,
}

impl Pipeline {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        parser: Arc<dyn PdfParser>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            storage,
            parser,
            records,
        }
    }

    /// Process one notification end to end.
    pub async fn process(&self, notification: &Notification) -> Result<Processed, PipelineError> {
        let span = tracing::info_span!(
            "process",
            invocation_id = %Uuid::new_v4(),
            bucket = %notification.bucket,
            raw_key = %notification.raw_key,
        );
        self.run(notification).instrument(span).await
    }

    async fn run(&self, notification: &Notification) -> Result<Processed, PipelineError> {
        let bucket = notification.bucket.as_str();
        let key = decode_key(&notification.raw_key)?;

        let head = self
            .storage
            .head(bucket, &key)
            .await
            .map_err(|err| {
                warn!("head failed for {}/{}: {}", bucket, key, err);
                PipelineError::from_storage(err, &key)
            })?;
        debug!(
            "head {}/{} => content_type={} size={}",
            bucket, key, head.content_type, head.size
        );

        let content = match ContentKind::from_content_type(&head.content_type) {
            ContentKind::Pdf => Some(self.extract_pdf(bucket, &key).await?),
            ContentKind::Other => None,
        };

        let file_id = derive_file_id(&key).to_string();
        debug!("derived file id `{}` from key `{}`", file_id, key);

        let update = match content {
            Some(content) => FileRecordUpdate {
                file_size: head.size,
                page_count: (content.page_count > 0).then_some(i64::from(content.page_count)),
                extracted_text: truncate_text(content.text),
                lambda_processed: true,
                s3_key: key,
            },
            None => FileRecordUpdate {
                file_size: head.size,
                page_count: None,
                extracted_text: String::new(),
                lambda_processed: true,
                s3_key: key,
            },
        };

        self.records
            .upsert(&file_id, &update)
            .await
            .inspect_err(|err| warn!("upsert of record `{}` failed: {}", file_id, err))?;

        info!(
            "processed record `{}` (size={}, pages={:?}, text_chars={})",
            file_id,
            update.file_size,
            update.page_count,
            update.extracted_text.chars().count()
        );
        Ok(Processed { file_id, update })
    }

    /// Download the whole object into memory and hand it to the parser.
    async fn extract_pdf(&self, bucket: &str, key: &str) -> Result<PdfContent, PipelineError> {
        let mut stream = self
            .storage
            .get(bucket, key)
            .await
            .map_err(|err| PipelineError::from_storage(err, key))?;

        let mut buffer = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|err| PipelineError::StorageUnavailable(StorageError::Io(err)))?;
            buffer.extend_from_slice(&chunk);
        }
        debug!("downloaded {} bytes from {}/{}", buffer.len(), bucket, key);

        let parser = Arc::clone(&self.parser);
        let content = tokio::task::spawn_blocking(move || parser.parse(&buffer))
            .await
            .map_err(|err| ExtractionError::Aborted(err.to_string()))?
            .inspect_err(|err| warn!("PDF extraction failed for {}/{}: {}", bucket, key, err))?;
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_plus_as_space() {
        assert_eq!(decode_key("inbox/invoice+1.pdf").unwrap(), "inbox/invoice 1.pdf");
    }

    #[test]
    fn decodes_percent_sequences() {
        assert_eq!(decode_key("a%2Fb%20c.pdf").unwrap(), "a/b c.pdf");
        assert_eq!(decode_key("caf%C3%A9.pdf").unwrap(), "café.pdf");
        // An encoded plus stays a plus.
        assert_eq!(decode_key("a%2Bb.txt").unwrap(), "a+b.txt");
    }

    #[test]
    fn rejects_empty_and_non_utf8_keys() {
        assert!(matches!(decode_key(""), Err(PipelineError::InvalidKey(_))));
        assert!(matches!(decode_key("%FF%FE"), Err(PipelineError::InvalidKey(_))));
    }

    #[test]
    fn rejects_malformed_escapes() {
        for raw in ["100%.pdf", "bad%ZZ.pdf", "trail%", "half%4", "%%41"] {
            assert!(
                matches!(decode_key(raw), Err(PipelineError::InvalidKey(_))),
                "key {:?} should be rejected",
                raw
            );
        }
        assert_eq!(decode_key("100%25.pdf").unwrap(), "100%.pdf");
        assert_eq!(decode_key("%41%62").unwrap(), "Ab");
    }

    #[test]
    fn file_id_derivation() {
        assert_eq!(derive_file_id("docs/report.v2.pdf"), "report");
        assert_eq!(derive_file_id("plainfile"), "plainfile");
        assert_eq!(derive_file_id("a/b/"), "");
        assert_eq!(derive_file_id("inbox/invoice 1.pdf"), "invoice 1");
        assert_eq!(derive_file_id(".hidden"), "");
    }

    #[test]
    fn colliding_basenames_share_an_id() {
        assert_eq!(derive_file_id("a/report.pdf"), derive_file_id("b/report.docx"));
    }

    #[test]
    fn truncation_counts_characters() {
        let short = "x".repeat(MAX_EXTRACTED_CHARS);
        assert_eq!(truncate_text(short.clone()), short);

        let long = "é".repeat(MAX_EXTRACTED_CHARS + 5);
        let truncated = truncate_text(long);
        assert_eq!(truncated.chars().count(), MAX_EXTRACTED_CHARS);
        assert_eq!(truncated.len(), MAX_EXTRACTED_CHARS * 2);
    }

    #[test]
    fn content_kind_is_exact_match() {
        assert_eq!(ContentKind::from_content_type("application/pdf"), ContentKind::Pdf);
        assert_eq!(ContentKind::from_content_type("Application/PDF"), ContentKind::Other);
        assert_eq!(
            ContentKind::from_content_type("application/pdf; charset=binary"),
            ContentKind::Other
        );
        assert_eq!(ContentKind::from_content_type("image/png"), ContentKind::Other);
    }
}
