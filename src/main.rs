use anyhow::Result;
use axum::Router;
use file_metadata_enricher::{
    config::{AppConfig, RunMode},
    db,
    handlers::event_handlers::invoke_once,
    routes,
    services::{
        object_storage::LocalObjectStore, pdf_parser::LopdfParser, pipeline::Pipeline,
        record_store::SqliteRecordStore, upload::Uploader,
    },
    state::AppState,
};
use std::{io::ErrorKind, path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + run mode ---
    let (cfg, mode) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting file-metadata-enricher with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);
    let records = Arc::new(SqliteRecordStore::new(db.clone(), cfg.table.clone())?);

    if mode == RunMode::Migrate {
        db::run_migrations(&db, &records).await?;
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Collaborators, built once and shared by every invocation ---
    let storage = Arc::new(LocalObjectStore::new(db.clone(), cfg.storage_dir.clone()));
    let pipeline = Pipeline::new(storage.clone(), Arc::new(LopdfParser), records.clone());

    if let RunMode::Invoke(path) = mode {
        invoke_once(&pipeline, &path).await?;
        return Ok(());
    }

    // --- Build router ---
    let state = AppState {
        pipeline,
        uploader: Uploader::new(storage, records.clone(), cfg.upload_bucket.clone()),
        records,
        db,
        storage_dir: PathBuf::from(&cfg.storage_dir),
        object_store_url: cfg.object_store_url.clone(),
    };
    let app: Router = routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
