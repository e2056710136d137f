use crate::services::record_store::is_valid_table_name;
use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, path::PathBuf};

pub const DEFAULT_TABLE: &str = "FileMetadata";
pub const DEFAULT_UPLOAD_BUCKET: &str = "uploads";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub table: String,
    /// Bucket uploads are stored in.
    pub upload_bucket: String,
    /// Base URL of the object store, used to build file URLs.
    pub object_store_url: String,
}

/// What the process should do once configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Serve,
    Migrate,
    /// Process the notification document at this path once, then exit.
    Invoke(PathBuf),
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Object metadata enrichment service")]
pub struct Args {
    /// Host to bind to (overrides ENRICHER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ENRICHER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where object payloads are stored (overrides ENRICHER_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides ENRICHER_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Record table name (overrides ENRICHER_TABLE)
    #[arg(long)]
    pub table: Option<String>,

    /// Bucket for uploaded files (overrides ENRICHER_UPLOAD_BUCKET)
    #[arg(long)]
    pub upload_bucket: Option<String>,

    /// Object store base URL for file links (overrides ENRICHER_OBJECT_STORE_URL)
    #[arg(long)]
    pub object_store_url: Option<String>,

    /// Create the schema and exit
    #[arg(long, conflicts_with = "event")]
    pub migrate: bool,

    /// Process a single notification document from a JSON file and exit
    #[arg(long, value_name = "PATH")]
    pub event: Option<PathBuf>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and run mode.
    pub fn from_env_and_args() -> Result<(Self, RunMode)> {
        Self::resolve(Args::parse(), |name| env::var(name))
    }

    /// Merge `args` over values from `lookup`, falling back to defaults.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<(Self, RunMode)>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let env_or = |name: &str, default: &str| -> Result<String> {
            match lookup(name) {
                Ok(value) => Ok(value),
                Err(env::VarError::NotPresent) => Ok(default.to_string()),
                Err(err) => Err(err).with_context(|| format!("reading {}", name)),
            }
        };

        // --- Environment fallback ---
        let env_host = env_or("ENRICHER_HOST", "0.0.0.0")?;
        let env_port = match lookup("ENRICHER_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing ENRICHER_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3001,
            Err(err) => return Err(err).context("reading ENRICHER_PORT"),
        };
        let env_storage = env_or("ENRICHER_STORAGE_DIR", "./data/objects")?;
        let env_db = env_or("ENRICHER_DATABASE_URL", "sqlite://./data/meta/object_store.db")?;
        let env_table = env_or("ENRICHER_TABLE", DEFAULT_TABLE)?;
        let env_bucket = env_or("ENRICHER_UPLOAD_BUCKET", DEFAULT_UPLOAD_BUCKET)?;
        let env_store_url = env_or("ENRICHER_OBJECT_STORE_URL", "http://localhost:3000")?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            table: args.table.unwrap_or(env_table),
            upload_bucket: args.upload_bucket.unwrap_or(env_bucket),
            object_store_url: args.object_store_url.unwrap_or(env_store_url),
        };

        if !is_valid_table_name(&cfg.table) {
            bail!("record table name `{}` is not a valid identifier", cfg.table);
        }
        if cfg.upload_bucket.is_empty() || cfg.upload_bucket.contains('/') {
            bail!("upload bucket `{}` is not a valid bucket name", cfg.upload_bucket);
        }

        let mode = match (args.migrate, args.event) {
            (true, _) => RunMode::Migrate,
            (false, Some(path)) => RunMode::Invoke(path),
            (false, None) => RunMode::Serve,
        };

        Ok((cfg, mode))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
