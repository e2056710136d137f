//! src/services/upload.rs
//!
//! Registers an uploaded file: the payload goes to the object store under
//! `uploads/{file_id}.{ext}` and a record holding the upload-time fields is
//! created under `file_id`. Enrichment happens later, when the object store's
//! notification for the new key reaches the pipeline; the derived file id of
//! that key is the same `file_id`, so the enrichment merges into this record.

use crate::{
    models::{
        object::DEFAULT_CONTENT_TYPE,
        record::NewFileRecord,
    },
    services::{
        object_storage::{ObjectStorage, StorageError},
        record_store::{RecordStore, RecordStoreError},
    },
};
use bytes::Bytes;
use chrono::NaiveDate;
use futures::{StreamExt, stream};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Key prefix for uploaded payloads.
pub const UPLOAD_PREFIX: &str = "uploads";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to upload file: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to register file: {0}")]
    Records(#[from] RecordStoreError),
}

/// A file received from a client.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    pub file_name: String,
    pub content_type: Option<String>,
    pub author_name: String,
    pub expiration_date: Option<NaiveDate>,
    pub body: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Uploaded {
    pub file_id: String,
    pub s3_key: String,
}

/// Object key for an upload: the file id plus the original extension when it
/// is plain alphanumeric.
pub fn upload_key(file_id: &str, file_name: &str) -> String {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    match extension {
        Some(ext) => format!("{}/{}.{}", UPLOAD_PREFIX, file_id, ext),
        None => format!("{}/{}", UPLOAD_PREFIX, file_id),
    }
}

/// Stores uploads and registers their records.
#[derive(Clone)]
pub struct Uploader {
    storage: Arc<dyn ObjectStorage>,
    records: Arc<dyn RecordStore>,
    bucket: String,
}

impl Uploader {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        records: Arc<dyn RecordStore>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            records,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn upload(&self, request: UploadRequest) -> Result<Uploaded, UploadError> {
        let file_id = Uuid::new_v4().to_string();
        let s3_key = upload_key(&file_id, &request.file_name);
        let content_type = request
            .content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let body = stream::once(async move { Ok::<_, std::io::Error>(request.body) }).boxed();
        let head = self
            .storage
            .put(&self.bucket, &s3_key, Some(content_type.as_str()), body)
            .await
            .inspect_err(|err| tracing::warn!("upload of {} failed: {}", s3_key, err))?;

        let record = NewFileRecord {
            file_name: request.file_name,
            content_type,
            author_name: request.author_name,
            expiration_date: request.expiration_date,
            file_size: head.size,
            s3_bucket: self.bucket.clone(),
            s3_key: s3_key.clone(),
        };
        self.records.create(&file_id, &record).await?;

        tracing::info!(
            "registered upload `{}` as {}/{} ({} bytes)",
            record.file_name,
            self.bucket,
            s3_key,
            head.size
        );
        Ok(Uploaded { file_id, s3_key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pipeline::derive_file_id;

    #[test]
    fn key_keeps_plain_extension() {
        assert_eq!(upload_key("abc", "report.final.pdf"), "uploads/abc.pdf");
        assert_eq!(upload_key("abc", "README"), "uploads/abc");
        assert_eq!(upload_key("abc", "archive."), "uploads/abc");
        assert_eq!(upload_key("abc", "odd.p/df"), "uploads/abc");
    }

    #[test]
    fn derived_id_of_upload_key_is_the_file_id() {
        let id = Uuid::new_v4().to_string();
        assert_eq!(derive_file_id(&upload_key(&id, "scan.pdf")), id);
        assert_eq!(derive_file_id(&upload_key(&id, "notes")), id);
    }
}
