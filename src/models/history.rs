use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum HistoryStatus {
    Success,
    Error,
}

impl HistoryStatus {
    pub fn from_success(success: bool) -> Self {
        if success {
            Self::Success
        } else {
            Self::Error
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One row of `email_history`. Rows are insert-only.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EmailHistoryRecord {
    pub id: i64,
    pub recipient_name: String,
    pub recipient_email: String,
    pub subject: String,
    /// JSON array of attachment display names
    pub files: String,
    pub status: HistoryStatus,
    pub message: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl EmailHistoryRecord {
    pub fn file_names(&self) -> Vec<String> {
        serde_json::from_str(&self.files).unwrap_or_default()
    }
}

/// What the recorder needs to know about a finished send attempt.
#[derive(Debug, Clone)]
pub struct SendAttempt {
    pub recipient_name: String,
    pub recipient_email: String,
    pub subject: String,
    pub file_names: Vec<String>,
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub id: String,
    pub recipient_name: String,
    pub recipient_email: String,
    pub subject: String,
    pub files: Vec<String>,
    pub status: HistoryStatus,
    pub message: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<EmailHistoryRecord> for HistoryResponse {
    fn from(r: EmailHistoryRecord) -> Self {
        let files = r.file_names();
        Self {
            id: r.id.to_string(),
            recipient_name: r.recipient_name,
            recipient_email: r.recipient_email,
            subject: r.subject,
            files,
            status: r.status,
            message: r.message,
            created_at: super::iso_timestamp(r.created_at),
            updated_at: super::iso_timestamp(r.updated_at),
        }
    }
}
