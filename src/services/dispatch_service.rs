/// Send workflow: validate, check recipient, check files, send, record, clean up
use std::path::Path;

use serde::Deserialize;
use sqlx::SqlitePool;

use crate::error::ApiError;
use crate::models::history::SendAttempt;
use crate::services::{address_service, history_service, stager};
use crate::smtp::{attachment_filename, Dispatcher, OutgoingEmail, SendOutcome};

#[derive(Debug, Clone, Deserialize)]
pub struct FileRef {
    pub path: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl FileRef {
    fn display_name(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => attachment_filename(&self.path),
        }
    }
}

/// Body of `POST /api/send-email`. Required fields are optional here so a
/// missing one is reported by name instead of as a parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendEmailRequest {
    #[serde(default)]
    pub receiver_email: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub files: Vec<FileRef>,
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Validating,
    RecipientCheck,
    FileCheck,
    Sending,
    Recording,
    Cleanup,
    Done,
}

struct Validated {
    receiver_email: String,
    subject: String,
    body: String,
}

fn required(value: &Option<String>, field: &str) -> Result<String, ApiError> {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
        _ => Err(ApiError::Validation(format!("{field} is required"))),
    }
}

fn validate(request: &SendEmailRequest) -> Result<Validated, ApiError> {
    let receiver_email = required(&request.receiver_email, "receiver_email")?
        .trim()
        .to_string();
    let subject = required(&request.subject, "subject")?;
    let body = required(&request.body, "body")?;
    if receiver_email.parse::<lettre::Address>().is_err() {
        return Err(ApiError::Validation(format!(
            "receiver_email is not a valid email address: {receiver_email}"
        )));
    }
    Ok(Validated {
        receiver_email,
        subject,
        body,
    })
}

/// Every referenced file must exist inside the upload directory. The first
/// missing one aborts the whole send.
async fn check_files(upload_dir: &Path, files: &[FileRef]) -> Result<Vec<String>, ApiError> {
    let mut resolved = Vec::with_capacity(files.len());
    for file in files {
        match stager::resolve_in_upload_dir(upload_dir, &file.path).await {
            Ok(Some(path)) => resolved.push(path.to_string_lossy().into_owned()),
            Ok(None) => return Err(ApiError::FileNotFound(file.path.clone())),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                return Err(ApiError::Validation(e.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(resolved)
}

/// Existing uploads among `files`, for cleanup after a decline.
async fn existing_uploads(upload_dir: &Path, files: &[FileRef]) -> Vec<String> {
    let mut existing = Vec::new();
    for file in files {
        if let Ok(Some(path)) = stager::resolve_in_upload_dir(upload_dir, &file.path).await {
            existing.push(path.to_string_lossy().into_owned());
        }
    }
    existing
}

/// Runs one send request to completion.
///
/// `Err` means the request was aborted before anything was sent. Once the
/// dispatcher has been called the result is always `Ok`, carrying the
/// dispatcher's outcome verbatim.
pub async fn send_email(
    pool: &SqlitePool,
    upload_dir: &Path,
    dispatcher: &dyn Dispatcher,
    request: SendEmailRequest,
) -> Result<SendOutcome, ApiError> {
    let mut stage = Stage::Validating;
    tracing::info!("starting email send");
    let valid = validate(&request)?;

    stage = advance(stage, Stage::RecipientCheck);
    let address = address_service::find_by_email(pool, &valid.receiver_email).await?;
    let recipient_name = request
        .recipient_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| address.as_ref().map(|a| a.name.clone()))
        .unwrap_or_default();
    let file_names: Vec<String> = request.files.iter().map(FileRef::display_name).collect();

    if address.as_ref().is_some_and(|a| !a.is_active()) {
        tracing::info!(to = %valid.receiver_email, "recipient inactive, send declined");
        let outcome = SendOutcome {
            success: false,
            message: format!(
                "Email not sent: {} is marked as inactive",
                valid.receiver_email
            ),
            failure: None,
        };
        stage = advance(stage, Stage::Recording);
        history_service::record(pool, &attempt(&valid, &recipient_name, file_names, &outcome)).await;
        stage = advance(stage, Stage::Cleanup);
        let existing = existing_uploads(upload_dir, &request.files).await;
        stager::remove_sent(&existing).await;
        advance(stage, Stage::Done);
        return Ok(outcome);
    }

    stage = advance(stage, Stage::FileCheck);
    let paths = check_files(upload_dir, &request.files).await?;

    stage = advance(stage, Stage::Sending);
    let outcome = dispatcher
        .send(OutgoingEmail {
            receiver_email: valid.receiver_email.clone(),
            subject: valid.subject.clone(),
            body: valid.body.clone(),
            file_paths: paths.clone(),
        })
        .await;
    if !outcome.success {
        tracing::error!(to = %valid.receiver_email, "email sending failed: {}", outcome.message);
    }

    stage = advance(stage, Stage::Recording);
    history_service::record(pool, &attempt(&valid, &recipient_name, file_names, &outcome)).await;

    stage = advance(stage, Stage::Cleanup);
    let removed = stager::remove_sent(&paths).await;
    tracing::debug!(removed, "cleanup finished");

    advance(stage, Stage::Done);
    Ok(outcome)
}

fn advance(from: Stage, to: Stage) -> Stage {
    tracing::trace!(?from, ?to, "send workflow");
    to
}

fn attempt(
    valid: &Validated,
    recipient_name: &str,
    file_names: Vec<String>,
    outcome: &SendOutcome,
) -> SendAttempt {
    SendAttempt {
        recipient_name: recipient_name.to_string(),
        recipient_email: valid.receiver_email.clone(),
        subject: valid.subject.clone(),
        file_names,
        success: outcome.success,
        message: outcome.message.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(receiver: Option<&str>, subject: Option<&str>, body: Option<&str>) -> SendEmailRequest {
        SendEmailRequest {
            receiver_email: receiver.map(Into::into),
            subject: subject.map(Into::into),
            body: body.map(Into::into),
            ..Default::default()
        }
    }

    #[test]
    fn missing_fields_are_named() {
        let err = validate(&request(None, Some("s"), Some("b"))).err().unwrap();
        assert_eq!(err.to_string(), "receiver_email is required");

        let err = validate(&request(Some("a@example.com"), Some("  "), Some("b"))).err().unwrap();
        assert_eq!(err.to_string(), "subject is required");

        let err = validate(&request(Some("a@example.com"), Some("s"), Some(""))).err().unwrap();
        assert_eq!(err.to_string(), "body is required");
    }

    #[test]
    fn malformed_receiver_is_a_validation_error() {
        let err = validate(&request(Some("nope"), Some("s"), Some("b"))).err().unwrap();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn display_name_falls_back_to_decoded_path() {
        let named = FileRef {
            path: "uploads/x.pdf".into(),
            name: Some("보고서.pdf".into()),
        };
        let unnamed = FileRef {
            path: "uploads/%EB%B3%B4%EA%B3%A0%EC%84%9C_1.pdf".into(),
            name: None,
        };
        assert_eq!(named.display_name(), "보고서.pdf");
        assert_eq!(unnamed.display_name(), "보고서_1.pdf");
    }

    #[tokio::test]
    async fn paths_outside_uploads_are_rejected() {
        let uploads = tempfile::tempdir().unwrap();
        let other = tempfile::NamedTempFile::new().unwrap();
        let files = vec![FileRef {
            path: other.path().to_string_lossy().into_owned(),
            name: None,
        }];
        let err = check_files(uploads.path(), &files).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }
}
