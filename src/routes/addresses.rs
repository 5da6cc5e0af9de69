/// Address book endpoints
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::error::ApiError;
use crate::models::address::{AddressResponse, AddressStatus, NewAddress};
use crate::services::address_service;

#[derive(Debug, Default, Deserialize)]
pub struct AddressQuery {
    pub status: Option<String>,
}

/// GET /api/addresses?status=
pub async fn list_addresses(
    State(pool): State<SqlitePool>,
    query: Result<Query<AddressQuery>, QueryRejection>,
) -> Result<Json<Vec<AddressResponse>>, ApiError> {
    let Query(query) = query?;
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(s) => Some(
            AddressStatus::parse(s)
                .ok_or_else(|| ApiError::Validation(format!("unknown status: {s}")))?,
        ),
    };
    let addresses = address_service::list(&pool, status).await?;
    Ok(Json(addresses.into_iter().map(Into::into).collect()))
}

/// GET /api/active-addresses
pub async fn list_active_addresses(
    State(pool): State<SqlitePool>,
) -> Result<Json<Vec<AddressResponse>>, ApiError> {
    let addresses = address_service::list_active(&pool).await?;
    Ok(Json(addresses.into_iter().map(Into::into).collect()))
}

/// POST /api/addresses
pub async fn create_address(
    State(pool): State<SqlitePool>,
    payload: Result<Json<NewAddress>, JsonRejection>,
) -> Result<(StatusCode, Json<AddressResponse>), ApiError> {
    let Json(new) = payload?;
    address_service::validate(&new).map_err(ApiError::Validation)?;
    let address = address_service::create(&pool, new).await?;
    Ok((StatusCode::CREATED, Json(address.into())))
}

/// PUT /api/addresses/:id
pub async fn update_address(
    State(pool): State<SqlitePool>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<NewAddress>, JsonRejection>,
) -> Result<Json<AddressResponse>, ApiError> {
    let Path(id) = id?;
    let Json(new) = payload?;
    address_service::validate(&new).map_err(ApiError::Validation)?;
    let address = address_service::update(&pool, id, new)
        .await?
        .ok_or(ApiError::NotFound("Address"))?;
    Ok(Json(address.into()))
}

/// DELETE /api/addresses/:id
pub async fn delete_address(
    State(pool): State<SqlitePool>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Path(id) = id?;
    if !address_service::delete(&pool, id).await? {
        return Err(ApiError::NotFound("Address"));
    }
    tracing::info!(id, "address deleted");
    Ok(Json(serde_json::json!({"success": true})))
}
