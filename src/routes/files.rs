use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::models::staged_file::UploadedFileInfo;
use crate::services::stager;
use crate::Config;

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub files: Vec<UploadedFileInfo>,
}

/// GET /api/files
pub async fn list_files(State(config): State<Arc<Config>>) -> Result<Json<FileListResponse>, ApiError> {
    let files = stager::list(&config.upload_dir).await?;
    Ok(Json(FileListResponse { files }))
}

/// DELETE /api/files - named files, or everything when no JSON body is sent
pub async fn delete_files(
    State(config): State<Arc<Config>>,
    body: Result<Json<Vec<String>>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let paths = match body {
        Ok(Json(paths)) => paths,
        // no JSON body at all means every file; a malformed one is an error
        Err(JsonRejection::MissingJsonContentType(_)) => Vec::new(),
        Err(rejection) => return Err(rejection.into()),
    };
    let removed = stager::delete(&config.upload_dir, &paths).await?;
    let message = if paths.is_empty() {
        "All files deleted successfully".to_string()
    } else {
        format!("{removed} files deleted successfully")
    };
    Ok(Json(serde_json::json!({"message": message, "deleted": removed})))
}
