use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::error::ApiError;
use crate::models::history::{HistoryResponse, HistoryStatus};
use crate::services::history_service::{self, parse_date, HistoryFilter};

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub status: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
}

fn date_param(name: &str, value: Option<&str>) -> Result<Option<chrono::DateTime<chrono::Utc>>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => parse_date(v)
            .map(Some)
            .ok_or_else(|| ApiError::Validation(format!("{name} is not an ISO-8601 date: {v}"))),
    }
}

impl HistoryQuery {
    fn into_filter(self) -> Result<HistoryFilter, ApiError> {
        let status = match self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => None,
            Some(s) => Some(
                HistoryStatus::parse(s)
                    .ok_or_else(|| ApiError::Validation(format!("unknown status: {s}")))?,
            ),
        };
        Ok(HistoryFilter {
            date_from: date_param("date_from", self.date_from.as_deref())?,
            date_to: date_param("date_to", self.date_to.as_deref())?,
            recipient: self.recipient,
            subject: self.subject,
            status,
        })
    }
}

/// GET /api/email-history
pub async fn email_history(
    State(pool): State<SqlitePool>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<HistoryResponse>>, ApiError> {
    let Query(query) = query?;
    let filter = query.into_filter()?;
    let rows = history_service::list(&pool, &filter).await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}
