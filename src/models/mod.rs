//! Data models for the enrichment pipeline.
//!
//! Notifications arrive as S3-style event documents, object heads come from the
//! object catalogue, and file records are what the pipeline persists. Records map
//! to SQLite rows via `sqlx::FromRow` and serialize as JSON via `serde`.

pub mod notification;
pub mod object;
pub mod record;
