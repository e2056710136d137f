//! Notification intake: one event document per request, one pipeline run.

use crate::{
    errors::AppError,
    models::notification::S3Event,
    services::pipeline::{Pipeline, PipelineError, Processed},
    state::AppState,
};
use anyhow::Context;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize)]
pub struct ProcessedResponse {
    pub status: &'static str,
    pub file_id: String,
}

/// `POST /events`
///
/// Runs the pipeline for the first record of the document. Collaborator
/// failures surface as error statuses so the sender can redeliver.
pub async fn handle_event(
    State(state): State<AppState>,
    Json(event): Json<S3Event>,
) -> Result<impl IntoResponse, AppError> {
    let notification = event
        .first_notification()
        .ok_or(PipelineError::InvalidNotification)?;
    if event.records.len() > 1 {
        tracing::warn!(
            "event carries {} records, only the first is processed",
            event.records.len()
        );
    }

    let processed = state.pipeline.process(&notification).await?;

    Ok((
        StatusCode::OK,
        Json(ProcessedResponse {
            status: "processed",
            file_id: processed.file_id,
        }),
    ))
}

/// Run the pipeline once for a notification document read from disk.
///
/// Backs the `--event` mode of the binary.
pub async fn invoke_once(pipeline: &Pipeline, path: &Path) -> anyhow::Result<Processed> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading event document {}", path.display()))?;
    let event: S3Event = serde_json::from_str(&raw)
        .with_context(|| format!("parsing event document {}", path.display()))?;
    let notification = event
        .first_notification()
        .ok_or(PipelineError::InvalidNotification)?;

    let processed = pipeline.process(&notification).await?;
    tracing::info!(
        "Processed {} into record `{}`",
        notification.raw_key,
        processed.file_id
    );
    Ok(processed)
}
