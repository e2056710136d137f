//! Shared harness: an in-memory SQLite catalogue + record table, a temp
//! directory for payloads, and stub collaborators for failure injection.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use file_metadata_enricher::{
    db,
    models::record::{FileRecord, FileRecordUpdate, NewFileRecord},
    services::{
        object_storage::LocalObjectStore,
        pdf_parser::{ExtractionError, PdfContent, PdfParser},
        pipeline::Pipeline,
        record_store::{RecordResult, RecordStore, RecordStoreError, SqliteRecordStore},
        upload::Uploader,
    },
    state::AppState,
};
use lopdf::{
    Document, Object, Stream,
    content::{Content, Operation},
    dictionary,
};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use uuid::Uuid;

pub struct TestEnv {
    pub db: Arc<SqlitePool>,
    pub dir: TempDir,
    pub storage: Arc<LocalObjectStore>,
    pub records: Arc<SqliteRecordStore>,
}

impl TestEnv {
    pub async fn new() -> Self {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        let db = Arc::new(pool);
        let dir = tempfile::tempdir().expect("temp dir");
        let storage = Arc::new(LocalObjectStore::new(db.clone(), dir.path()));
        let records = Arc::new(SqliteRecordStore::new(db.clone(), "FileMetadata").unwrap());
        db::run_migrations(&db, &records).await.expect("migrations");
        Self {
            db,
            dir,
            storage,
            records,
        }
    }

    /// Pipeline over the local store and SQLite records with the given parser.
    pub fn pipeline(&self, parser: Arc<dyn PdfParser>) -> Pipeline {
        Pipeline::new(self.storage.clone(), parser, self.records.clone())
    }

    pub fn uploader(&self) -> Uploader {
        Uploader::new(self.storage.clone(), self.records.clone(), "uploads")
    }

    /// Handler state wired like the binary, with the given parser.
    pub fn state(&self, parser: Arc<dyn PdfParser>) -> AppState {
        AppState {
            pipeline: self.pipeline(parser),
            uploader: self.uploader(),
            records: self.records.clone(),
            db: self.db.clone(),
            storage_dir: self.dir.path().to_path_buf(),
            object_store_url: "http://objects.test".to_string(),
        }
    }

    /// Register an object in the catalogue without writing a payload.
    pub async fn catalogue_object(&self, bucket: &str, key: &str, content_type: &str, size: i64) {
        sqlx::query(
            "INSERT OR IGNORE INTO buckets (id, name, owner_id, region, created_at, versioning_enabled)
             VALUES (?, ?, ?, 'local', ?, 0)",
        )
        .bind(Uuid::new_v4())
        .bind(bucket)
        .bind(Uuid::new_v4())
        .bind(Utc::now())
        .execute(&*self.db)
        .await
        .unwrap();

        let filename = key.rsplit('/').next().unwrap_or(key);
        sqlx::query(
            "INSERT INTO objects (id, bucket_id, key, filename, content_type, size_bytes,
                                  etag, storage_class, last_modified, version_id, is_deleted)
             SELECT ?, id, ?, ?, ?, ?, NULL, 'STANDARD', ?, NULL, 0 FROM buckets WHERE name = ?",
        )
        .bind(Uuid::new_v4())
        .bind(key)
        .bind(filename)
        .bind(content_type)
        .bind(size)
        .bind(Utc::now())
        .bind(bucket)
        .execute(&*self.db)
        .await
        .unwrap();
    }

    /// Register an object and write its payload where the store expects it.
    pub async fn put_object(&self, bucket: &str, key: &str, content_type: &str, size: i64, body: &[u8]) {
        self.catalogue_object(bucket, key, content_type, size).await;
        let path = self.storage.object_path(bucket, key);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, body).await.unwrap();
    }

    pub async fn soft_delete(&self, key: &str) {
        sqlx::query("UPDATE objects SET is_deleted = 1 WHERE key = ?")
            .bind(key)
            .execute(&*self.db)
            .await
            .unwrap();
    }

    pub async fn record(&self, file_id: &str) -> Option<FileRecord> {
        self.records.get(file_id).await.unwrap()
    }

    pub async fn record_count(&self) -> i64 {
        sqlx::query_scalar::<_, i64>(r#"SELECT COUNT(*) FROM "FileMetadata""#)
            .fetch_one(&*self.db)
            .await
            .unwrap()
    }
}

/// A PDF with one page per entry, each page showing its text.
pub fn pdf_bytes(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Parser returning fixed content regardless of input.
pub struct StubParser {
    pub content: PdfContent,
}

impl StubParser {
    pub fn new(page_count: u32, text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            content: PdfContent {
                page_count,
                text: text.into(),
            },
        })
    }
}

impl PdfParser for StubParser {
    fn parse(&self, _bytes: &[u8]) -> Result<PdfContent, ExtractionError> {
        Ok(self.content.clone())
    }
}

/// Parser that always fails.
pub struct FailingParser;

impl PdfParser for FailingParser {
    fn parse(&self, _bytes: &[u8]) -> Result<PdfContent, ExtractionError> {
        Err(ExtractionError::Aborted("corrupt document".into()))
    }
}

/// Record store that only remembers the writes it received.
#[derive(Default)]
pub struct RecordingStore {
    pub writes: Mutex<Vec<(String, FileRecordUpdate)>>,
}

impl RecordingStore {
    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

#[async_trait]
impl RecordStore for RecordingStore {
    async fn upsert(&self, file_id: &str, update: &FileRecordUpdate) -> RecordResult<()> {
        self.writes
            .lock()
            .unwrap()
            .push((file_id.to_string(), update.clone()));
        Ok(())
    }

    async fn create(&self, _file_id: &str, _record: &NewFileRecord) -> RecordResult<()> {
        Ok(())
    }

    async fn get(&self, _file_id: &str) -> RecordResult<Option<FileRecord>> {
        Ok(None)
    }
}

/// Record store whose writes always fail.
pub struct UnavailableStore;

#[async_trait]
impl RecordStore for UnavailableStore {
    async fn upsert(&self, _file_id: &str, _update: &FileRecordUpdate) -> RecordResult<()> {
        Err(RecordStoreError::Sqlx(sqlx::Error::PoolTimedOut))
    }

    async fn create(&self, _file_id: &str, _record: &NewFileRecord) -> RecordResult<()> {
        Err(RecordStoreError::Sqlx(sqlx::Error::PoolTimedOut))
    }

    async fn get(&self, _file_id: &str) -> RecordResult<Option<FileRecord>> {
        Err(RecordStoreError::Sqlx(sqlx::Error::PoolTimedOut))
    }
}
