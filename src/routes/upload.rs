use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::models::StagedFile;
use crate::services::stager;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub files: Vec<StagedFile>,
}

/// POST /api/upload - stage every `files` part of a multipart body
pub async fn upload_files(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut multipart = multipart?;
    let mut staged = Vec::new();
    let mut saw_file_part = false;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("files") {
            continue;
        }
        saw_file_part = true;
        let Some(file_name) = field.file_name().map(str::to_string).filter(|n| !n.is_empty())
        else {
            continue;
        };
        let content = field.bytes().await.map_err(|e| {
            tracing::warn!(file = %file_name, status = %e.status(), "could not read upload");
            ApiError::from(e)
        })?;

        let file = stager::stage(&state.config.upload_dir, &file_name, &content)
            .await
            .map_err(|e| {
                tracing::error!(file = %file_name, error = %e, "upload failed");
                ApiError::Internal(e.to_string())
            })?;
        staged.push(file);
    }

    if !saw_file_part {
        return Err(ApiError::Validation("No file part".into()));
    }

    tracing::info!(count = staged.len(), "files uploaded");
    Ok(Json(UploadResponse {
        message: "Files uploaded successfully".into(),
        files: staged,
    }))
}
