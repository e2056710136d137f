use crate::{errors::AppError, models::record::FileRecordView, state::AppState};
use axum::{
    Json,
    extract::{Path, State},
};

/// `GET /files/{file_id}`: the stored record for a file id, with its file URL.
pub async fn get_file(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Result<Json<FileRecordView>, AppError> {
    let record = state
        .records
        .get(&file_id)
        .await
        .map_err(|err| AppError::internal(err.to_string()))?;

    record
        .map(|record| Json(FileRecordView::new(record, &state.object_store_url)))
        .ok_or_else(|| AppError::not_found(format!("file `{}` not found", file_id)))
}
