//! Multipart upload intake.

use crate::{
    errors::AppError,
    services::upload::UploadRequest,
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Serialize;

/// Largest request body accepted by `POST /upload`.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

const MAX_AUTHOR_NAME_CHARS: usize = 255;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub file_id: String,
}

fn bad_request(err: MultipartError) -> AppError {
    AppError::new(StatusCode::BAD_REQUEST, err.body_text())
}

/// `POST /upload`
///
/// Form fields: `file` (required), `author_name`, `expiration_date` (`YYYY-MM-DD`).
/// Responds `201 {"file_id": ..}`.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut file = None;
    let mut author_name = String::new();
    let mut expiration_date = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let body = field.bytes().await.map_err(bad_request)?;
                file = Some((file_name, content_type, body));
            }
            "author_name" => {
                author_name = field.text().await.map_err(bad_request)?;
                if author_name.chars().count() > MAX_AUTHOR_NAME_CHARS {
                    return Err(AppError::new(
                        StatusCode::BAD_REQUEST,
                        format!("author_name exceeds {} characters", MAX_AUTHOR_NAME_CHARS),
                    ));
                }
            }
            "expiration_date" => {
                let raw = field.text().await.map_err(bad_request)?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                        AppError::new(
                            StatusCode::BAD_REQUEST,
                            format!("expiration_date `{}` is not YYYY-MM-DD", raw),
                        )
                    })?;
                    expiration_date = Some(date);
                }
            }
            other => tracing::debug!("ignoring upload field `{}`", other),
        }
    }

    let (file_name, content_type, body) = file.ok_or_else(|| {
        AppError::new(StatusCode::BAD_REQUEST, "missing `file` field")
    })?;

    let uploaded = state
        .uploader
        .upload(UploadRequest {
            file_name,
            content_type,
            author_name,
            expiration_date,
            body,
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            file_id: uploaded.file_id,
        }),
    ))
}
