//! src/services/object_storage.rs
//!
//! Access to objects held by the local object store: metadata lives in the
//! SQLite catalogue (`buckets`, `objects`) and payloads on disk sharded
//! beneath `base_path/{bucket}/{shard}/{shard}/{key}`.

use crate::models::object::{DEFAULT_CONTENT_TYPE, ObjectHead};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    io,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

/// Object body as a stream of chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send>>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Head/get access to stored objects.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Content type and size of an object, without reading its body.
    async fn head(&self, bucket: &str, key: &str) -> StorageResult<ObjectHead>;

    /// Full object body as a byte stream.
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<ByteStream>;

    /// Store `body` under `key`, replacing any previous object.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        body: ByteStream,
    ) -> StorageResult<ObjectHead>;
}

/// [`ObjectStorage`] over the object store's SQLite catalogue and on-disk payloads.
#[derive(Clone)]
pub struct LocalObjectStore {
    /// Shared SQLite connection pool holding the object catalogue.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

const MAX_OBJECT_KEY_LEN: usize = 1024;

impl LocalObjectStore {
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Reject keys that could escape the bucket directory.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.contains("..") {
            return Err(StorageError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Two-level shard directories for a key: the first two bytes of
    /// MD5(bucket/key) as lowercase hex.
    fn object_shards(bucket: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// Location of an object's payload. Does not check for existence.
    pub fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket, key);
        let mut path = self.base_path.clone();
        path.push(bucket);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Id of the named bucket, registering it on first use.
    async fn ensure_bucket(&self, bucket: &str) -> StorageResult<Uuid> {
        sqlx::query(
            "INSERT INTO buckets (id, name, owner_id, region, created_at, versioning_enabled)
             VALUES (?, ?, ?, 'local', ?, 0)
             ON CONFLICT(name) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(bucket)
        .bind(Uuid::new_v4())
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;

        let id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM buckets WHERE name = ?")
            .bind(bucket)
            .fetch_one(&*self.db)
            .await?;
        Ok(id)
    }

    fn not_found(bucket: &str, key: &str) -> StorageError {
        StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStore {
    async fn head(&self, bucket: &str, key: &str) -> StorageResult<ObjectHead> {
        self.ensure_key_safe(key)?;
        let (content_type, size_bytes) = sqlx::query_as::<_, (Option<String>, i64)>(
            "SELECT o.content_type, o.size_bytes
             FROM objects o
             JOIN buckets b ON b.id = o.bucket_id
             WHERE b.name = ? AND o.key = ? AND o.is_deleted = 0",
        )
        .bind(bucket)
        .bind(key)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => Self::not_found(bucket, key),
            other => StorageError::Sqlx(other),
        })?;

        Ok(ObjectHead {
            content_type: content_type.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.into()),
            size: size_bytes.max(0),
        })
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<ByteStream> {
        self.ensure_key_safe(key)?;
        let file_path = self.object_path(bucket, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                Self::not_found(bucket, key)
            } else {
                StorageError::Io(err)
            }
        })?;
        tracing::debug!("streaming object payload from {}", file_path.display());
        Ok(ReaderStream::new(file).boxed())
    }

    /// Writes to a temp file, renames it into place, then upserts the
    /// catalogue row. The payload is removed again if the catalogue write fails.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<&str>,
        body: ByteStream,
    ) -> StorageResult<ObjectHead> {
        self.ensure_key_safe(key)?;
        let file_path = self.object_path(bucket, key);
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StorageError::Io(io::Error::other("object path missing parent")))?;
        fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let (size_bytes, etag) = match write_payload(&tmp_path, body).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };
        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        let catalogued = async {
            let bucket_id = self.ensure_bucket(bucket).await?;
            let filename = key.rsplit('/').next().unwrap_or(key);
            sqlx::query(
                r#"
                INSERT INTO objects (
                    id, bucket_id, key, filename, content_type, size_bytes,
                    etag, storage_class, last_modified, version_id, is_deleted
                ) VALUES (?, ?, ?, ?, ?, ?, ?, 'STANDARD', ?, NULL, 0)
                ON CONFLICT(bucket_id, key) DO UPDATE SET
                    filename = excluded.filename,
                    content_type = excluded.content_type,
                    size_bytes = excluded.size_bytes,
                    etag = excluded.etag,
                    last_modified = excluded.last_modified,
                    is_deleted = 0
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(bucket_id)
            .bind(key)
            .bind(filename)
            .bind(content_type)
            .bind(size_bytes)
            .bind(&etag)
            .bind(Utc::now())
            .execute(&*self.db)
            .await?;
            Ok::<_, StorageError>(())
        }
        .await;

        if let Err(err) = catalogued {
            let _ = fs::remove_file(&file_path).await;
            return Err(err);
        }

        tracing::debug!("stored {} bytes at {}/{} (etag {})", size_bytes, bucket, key, etag);
        Ok(ObjectHead {
            content_type: content_type.unwrap_or(DEFAULT_CONTENT_TYPE).to_string(),
            size: size_bytes,
        })
    }
}

/// Stream `body` into a new file at `path`, returning its size and MD5 etag.
async fn write_payload(path: &Path, mut body: ByteStream) -> StorageResult<(i64, String)> {
    let mut file = File::create(path).await?;
    let mut size_bytes: i64 = 0;
    let mut digest = Context::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as i64;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok((size_bytes, format!("{:x}", digest.compute())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> LocalObjectStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        LocalObjectStore::new(Arc::new(pool), "/tmp/objects")
    }

    #[tokio::test]
    async fn unsafe_keys_are_rejected() {
        let store = store().await;
        for key in ["", "/etc/passwd", "a/../b", "bad\\key", "tab\tkey"] {
            assert!(
                matches!(store.ensure_key_safe(key), Err(StorageError::InvalidObjectKey)),
                "key {:?} should be rejected",
                key
            );
        }
        assert!(store.ensure_key_safe("inbox/invoice 1.pdf").is_ok());
        assert!(store.ensure_key_safe(&"k".repeat(MAX_OBJECT_KEY_LEN + 1)).is_err());
    }

    #[tokio::test]
    async fn object_path_is_sharded_under_bucket() {
        let store = store().await;
        let path = store.object_path("docs", "inbox/a.pdf");
        let (a, b) = LocalObjectStore::object_shards("docs", "inbox/a.pdf");
        assert_eq!(a.len(), 2);
        assert_eq!(
            path,
            PathBuf::from("/tmp/objects/docs").join(a).join(b).join("inbox/a.pdf")
        );
    }
}
