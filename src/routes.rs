//! Routes of the enrichment service.
//!
//! - `POST /events`          — process one object-created notification
//! - `POST /upload`          — store a file and register its record
//! - `GET  /files/{file_id}` — read back a stored record
//! - `GET  /healthz`, `GET /readyz` — liveness and readiness

use crate::{
    handlers::{
        event_handlers::handle_event,
        file_handlers::get_file,
        health_handlers::{healthz, readyz},
        upload_handlers::{MAX_UPLOAD_BYTES, upload_file},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router; the caller supplies [`AppState`] via `with_state`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/events", post(handle_event))
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/files/{file_id}", get(get_file))
}
