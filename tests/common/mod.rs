#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use attachmail::config::{AllowedOrigins, SmtpSettings};
use attachmail::smtp::{Dispatcher, OutgoingEmail, SendFailure, SendOutcome};
use attachmail::{db, AppState, Config};

/// Records every send and answers with a canned result.
pub struct FakeDispatcher {
    pub calls: Mutex<Vec<OutgoingEmail>>,
    /// Whether each attachment existed when `send` ran
    pub files_present: Mutex<Vec<bool>>,
    failure: Option<SendFailure>,
}

impl FakeDispatcher {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            files_present: Mutex::new(Vec::new()),
            failure: None,
        })
    }

    pub fn failing(failure: SendFailure) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            files_present: Mutex::new(Vec::new()),
            failure: Some(failure),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Dispatcher for FakeDispatcher {
    async fn send(&self, email: OutgoingEmail) -> SendOutcome {
        let present = email.file_paths.iter().all(|p| Path::new(p).exists());
        self.files_present.lock().unwrap().push(present);
        let receiver = email.receiver_email.clone();
        self.calls.lock().unwrap().push(email);
        match &self.failure {
            None => SendOutcome::sent(&receiver),
            Some(f) => SendOutcome::failed(&receiver, f.clone()),
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub pool: sqlx::SqlitePool,
    pub upload_dir: PathBuf,
    _uploads: tempfile::TempDir,
}

pub async fn spawn(dispatcher: Arc<FakeDispatcher>) -> TestApp {
    spawn_with_limit(dispatcher, 16 * 1024 * 1024).await
}

pub async fn spawn_with_limit(dispatcher: Arc<FakeDispatcher>, max_upload_bytes: usize) -> TestApp {
    let uploads = tempfile::tempdir().unwrap();
    let upload_dir = uploads.path().to_path_buf();
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations");

    let pool = db::connect("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool, &migrations_dir).await.unwrap();

    let config = Config {
        database_url: "sqlite::memory:".into(),
        migrations_dir,
        smtp: SmtpSettings {
            host: "127.0.0.1".into(),
            port: 587,
            sender_email: "sender@example.com".into(),
            password: "secret".into(),
            hello_name: None,
            timeout: Duration::from_secs(10),
        },
        upload_dir: upload_dir.clone(),
        max_upload_bytes,
        allowed_origins: AllowedOrigins::Any,
        port: 0,
    };

    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config),
        dispatcher,
    };

    TestApp {
        router: attachmail::app(state),
        pool,
        upload_dir,
        _uploads: uploads,
    }
}

impl TestApp {
    pub async fn request(&self, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                panic!("{status} body is not JSON ({e}): {}", String::from_utf8_lossy(&bytes))
            })
        };
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        self.request(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    /// Sends `body` verbatim as `application/json`.
    pub async fn send_raw_json(
        &self,
        method: &str,
        uri: &str,
        body: &str,
    ) -> (StatusCode, serde_json::Value) {
        self.request(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn send_json(
        &self,
        method: &str,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        self.request(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Uploads `(file name, content)` pairs as repeated `files` parts.
    pub async fn upload(&self, files: &[(&str, &[u8])]) -> (StatusCode, serde_json::Value) {
        let boundary = "attachmail-test-boundary";
        let mut body = Vec::new();
        for (name, content) in files {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        self.request(
            Request::post("/api/upload")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    pub async fn add_address(&self, name: &str, email: &str, status: &str) -> serde_json::Value {
        let (code, body) = self
            .send_json(
                "POST",
                "/api/addresses",
                serde_json::json!({"name": name, "email": email, "status": status}),
            )
            .await;
        assert_eq!(code, StatusCode::CREATED, "{body}");
        body
    }

    pub async fn history(&self) -> Vec<serde_json::Value> {
        let (code, body) = self.get("/api/email-history").await;
        assert_eq!(code, StatusCode::OK);
        body.as_array().unwrap().clone()
    }
}
