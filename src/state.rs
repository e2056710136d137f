//! Shared application state handed to every handler.

use crate::services::{pipeline::Pipeline, record_store::RecordStore, upload::Uploader};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub uploader: Uploader,
    pub records: Arc<dyn RecordStore>,
    /// Pool backing both the object catalogue and the record table.
    pub db: Arc<SqlitePool>,
    /// Root of the object payload directory.
    pub storage_dir: PathBuf,
    /// Base URL of the object store, for file links.
    pub object_store_url: String,
}
