use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use crate::error::ApiError;
use crate::services::dispatch_service::{self, SendEmailRequest};
use crate::smtp::SendOutcome;
use crate::AppState;

/// POST /api/send-email
pub async fn send_email(
    State(state): State<AppState>,
    payload: Result<Json<SendEmailRequest>, JsonRejection>,
) -> Result<Json<SendOutcome>, ApiError> {
    let Json(request) = payload?;
    let outcome = dispatch_service::send_email(
        &state.pool,
        &state.config.upload_dir,
        state.dispatcher.as_ref(),
        request,
    )
    .await?;
    Ok(Json(outcome))
}
