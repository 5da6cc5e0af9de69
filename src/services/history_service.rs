/// Send history: one insert-only row per send attempt
use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::db::now_epoch;
use crate::models::history::{EmailHistoryRecord, HistoryStatus, SendAttempt};

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Substring of the recipient name or email
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub status: Option<HistoryStatus>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

/// Stores the attempt. A database failure is logged and swallowed: the send
/// result is already decided and must reach the caller unchanged.
pub async fn record(pool: &SqlitePool, attempt: &SendAttempt) {
    if let Err(e) = insert(pool, attempt).await {
        tracing::error!(
            to = %attempt.recipient_email,
            subject = %attempt.subject,
            error = %e,
            "failed to record email history"
        );
    }
}

async fn insert(pool: &SqlitePool, attempt: &SendAttempt) -> Result<i64> {
    let files = serde_json::to_string(&attempt.file_names)?;
    let status = HistoryStatus::from_success(attempt.success);
    let now = now_epoch();
    let result = sqlx::query(
        r#"
        INSERT INTO email_history (
            recipient_name, recipient_email, subject, files, status, message, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&attempt.recipient_name)
    .bind(&attempt.recipient_email)
    .bind(&attempt.subject)
    .bind(files)
    .bind(status)
    .bind(&attempt.message)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    tracing::debug!(id = result.last_insert_rowid(), status = ?status, "history recorded");
    Ok(result.last_insert_rowid())
}

/// Matching rows, newest first.
pub async fn list(pool: &SqlitePool, filter: &HistoryFilter) -> Result<Vec<EmailHistoryRecord>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT id, recipient_name, recipient_email, subject, files, status, message, created_at, updated_at \
         FROM email_history WHERE 1 = 1",
    );

    if let Some(recipient) = filter.recipient.as_deref().filter(|r| !r.is_empty()) {
        let pattern = like_pattern(recipient);
        qb.push(" AND (lower(recipient_name) LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR lower(recipient_email) LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }
    if let Some(subject) = filter.subject.as_deref().filter(|s| !s.is_empty()) {
        qb.push(" AND lower(subject) LIKE ")
            .push_bind(like_pattern(subject))
            .push(" ESCAPE '\\'");
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(from) = filter.date_from {
        qb.push(" AND created_at >= ").push_bind(from.timestamp());
    }
    if let Some(to) = filter.date_to {
        qb.push(" AND created_at <= ").push_bind(to.timestamp());
    }
    qb.push(" ORDER BY created_at DESC, id DESC");

    let rows = qb
        .build_query_as::<EmailHistoryRecord>()
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM:SS[.f]` (UTC) or `YYYY-MM-DD`.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
