//! SMTP delivery of a composed message with file attachments.
//!
//! The session is driven step by step over lettre's [`SmtpConnection`] so the
//! reply to each envelope command can be checked: `MAIL FROM` must answer 250,
//! `RCPT TO` 250 or 251. Every failure ends up in a [`SendOutcome`]; nothing
//! is raised to the caller.

use std::error::Error as _;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{SmtpConnection, TlsParameters};
use lettre::transport::smtp::commands::{Data, Mail, Rcpt};
use lettre::transport::smtp::extension::ClientId;
use lettre::transport::smtp::response::Response;
use lettre::{Address, Message};
use percent_encoding::percent_decode_str;
use serde::Serialize;

use crate::config::SmtpSettings;

/// Implicit TLS port; every other port upgrades with STARTTLS.
const SMTPS_PORT: u16 = 465;

/// Everything needed to compose and deliver one email.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub receiver_email: String,
    pub subject: String,
    pub body: String,
    pub file_paths: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpStage {
    MailFrom,
    RcptTo,
    Data,
}

impl SmtpStage {
    fn as_str(&self) -> &'static str {
        match self {
            Self::MailFrom => "MAIL FROM",
            Self::RcptTo => "RCPT TO",
            Self::Data => "DATA",
        }
    }
}

/// Why a send did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendFailure {
    /// An envelope or data command got a reply code outside the accepted set.
    Rejected {
        stage: SmtpStage,
        code: u16,
        text: String,
    },
    Attachment { path: String, reason: String },
    Compose(String),
    Connection(String),
    /// The server stopped answering within the configured timeout.
    Timeout(Duration),
    Tls(String),
    Auth(String),
    Protocol(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct SendOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip)]
    pub failure: Option<SendFailure>,
}

impl SendOutcome {
    pub fn sent(receiver: &str) -> Self {
        Self {
            success: true,
            message: format!("Email sent successfully to {receiver}"),
            failure: None,
        }
    }

    pub fn failed(receiver: &str, failure: SendFailure) -> Self {
        let reason = match &failure {
            SendFailure::Rejected { stage, code, text } => {
                format!("{} rejected with {code}: {text}", stage.as_str())
            }
            SendFailure::Attachment { path, reason } => {
                format!("could not attach {path}: {reason}")
            }
            SendFailure::Compose(e) => format!("could not compose message: {e}"),
            SendFailure::Connection(e) => format!("connection failed: {e}"),
            SendFailure::Timeout(after) => format!("timed out after {}s", after.as_secs()),
            SendFailure::Tls(e) => format!("TLS negotiation failed: {e}"),
            SendFailure::Auth(e) => format!("authentication failed: {e}"),
            SendFailure::Protocol(e) => format!("SMTP error: {e}"),
        };
        Self {
            success: false,
            message: format!("Failed to send email to {receiver}: {reason}"),
            failure: Some(failure),
        }
    }
}

/// Delivery backend used by the send workflow.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    /// Sends one email. Calling twice sends twice.
    async fn send(&self, email: OutgoingEmail) -> SendOutcome;
}

/// Authenticated SMTP over TLS.
#[derive(Debug, Clone)]
pub struct SmtpDispatcher {
    settings: SmtpSettings,
}

impl SmtpDispatcher {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    fn hello_name(&self) -> ClientId {
        match &self.settings.hello_name {
            Some(name) => ClientId::Domain(name.clone()),
            None => ClientId::Domain(self.settings.host.clone()),
        }
    }

    /// Socket timeouts surface as `WouldBlock` or `TimedOut` I/O errors.
    fn transport_failure(
        &self,
        err: lettre::transport::smtp::Error,
        other: fn(String) -> SendFailure,
    ) -> SendFailure {
        if is_timeout(&err) {
            SendFailure::Timeout(self.settings.timeout)
        } else {
            other(err.to_string())
        }
    }

    fn send_blocking(&self, email: &OutgoingEmail) -> Result<(), SendFailure> {
        let message = build_message(&self.settings.sender_email, email)?;
        let from: Address = self
            .settings
            .sender_email
            .parse()
            .map_err(|e| SendFailure::Compose(format!("sender address: {e}")))?;
        let to: Address = email
            .receiver_email
            .parse()
            .map_err(|e| SendFailure::Compose(format!("receiver address: {e}")))?;

        let host = self.settings.host.as_str();
        let port = self.settings.port;
        let hello = self.hello_name();
        let tls = TlsParameters::new(host.to_string()).map_err(|e| SendFailure::Tls(e.to_string()))?;

        tracing::debug!(host, port, "connecting to SMTP server");
        let implicit_tls = (port == SMTPS_PORT).then_some(&tls);
        let mut conn = SmtpConnection::connect(
            (host, port),
            Some(self.settings.timeout),
            &hello,
            implicit_tls,
            None,
        )
        .map_err(|e| self.transport_failure(e, SendFailure::Connection))?;

        let result = self.converse(&mut conn, &tls, &hello, from, to, &message.formatted());
        if let Err(e) = conn.quit() {
            tracing::debug!(error = %e, "QUIT failed");
        }
        result
    }

    fn converse(
        &self,
        conn: &mut SmtpConnection,
        tls: &TlsParameters,
        hello: &ClientId,
        from: Address,
        to: Address,
        raw: &[u8],
    ) -> Result<(), SendFailure> {
        if self.settings.port != SMTPS_PORT {
            if !conn.can_starttls() {
                return Err(SendFailure::Tls(
                    "server does not offer STARTTLS".to_string(),
                ));
            }
            tracing::debug!("starting TLS");
            conn.starttls(tls, hello)
                .map_err(|e| self.transport_failure(e, SendFailure::Tls))?;
        }

        tracing::debug!(user = %self.settings.sender_email, "logging in");
        let credentials = Credentials::new(
            self.settings.sender_email.clone(),
            self.settings.password.clone(),
        );
        conn.auth(&[Mechanism::Plain, Mechanism::Login], &credentials)
            .map_err(|e| self.transport_failure(e, SendFailure::Auth))?;

        check_reply(
            SmtpStage::MailFrom,
            conn.command(Mail::new(Some(from), vec![])),
            &[250],
        )?;
        check_reply(
            SmtpStage::RcptTo,
            conn.command(Rcpt::new(to, vec![])),
            &[250, 251],
        )?;
        check_reply(SmtpStage::Data, conn.command(Data), &[354])?;

        tracing::debug!(bytes = raw.len(), "transmitting message");
        check_reply(SmtpStage::Data, conn.message(raw), &[250])?;
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for SmtpDispatcher {
    async fn send(&self, email: OutgoingEmail) -> SendOutcome {
        let receiver = email.receiver_email.clone();
        let dispatcher = self.clone();
        let joined = tokio::task::spawn_blocking(move || dispatcher.send_blocking(&email)).await;

        match joined {
            Ok(Ok(())) => {
                tracing::info!(to = %receiver, "email sent");
                SendOutcome::sent(&receiver)
            }
            Ok(Err(failure)) => {
                let outcome = SendOutcome::failed(&receiver, failure);
                tracing::error!(to = %receiver, failure = ?outcome.failure, "{}", outcome.message);
                outcome
            }
            Err(e) => {
                tracing::error!(to = %receiver, error = %e, "SMTP worker did not finish");
                SendOutcome::failed(&receiver, SendFailure::Protocol(e.to_string()))
            }
        }
    }
}

/// Maps a command reply onto the accepted codes for `stage`.
pub fn check_reply(
    stage: SmtpStage,
    reply: Result<Response, lettre::transport::smtp::Error>,
    accepted: &[u16],
) -> Result<(), SendFailure> {
    match reply {
        Ok(response) => {
            let code = reply_code(&response);
            if accepted.contains(&code) {
                Ok(())
            } else {
                Err(SendFailure::Rejected {
                    stage,
                    code,
                    text: response.message().collect::<Vec<_>>().join(" "),
                })
            }
        }
        // lettre turns 4xx/5xx replies into errors carrying the reply text as source
        Err(e) => match e.status() {
            Some(code) => Err(SendFailure::Rejected {
                stage,
                code: code.to_string().parse().unwrap_or_default(),
                text: e
                    .source()
                    .map(|reply| reply.to_string())
                    .unwrap_or_else(|| e.to_string()),
            }),
            None => Err(SendFailure::Protocol(e.to_string())),
        },
    }
}

fn is_timeout(err: &lettre::transport::smtp::Error) -> bool {
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut);
        }
        source = inner.source();
    }
    false
}

fn reply_code(response: &Response) -> u16 {
    response.code().to_string().parse().unwrap_or_default()
}

/// Attachment name shown to the receiver: the path's base name, decoded
/// when it carries percent escapes from staging.
pub fn attachment_filename(path: &str) -> String {
    let base = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    if base.contains('%') {
        percent_decode_str(&base).decode_utf8_lossy().into_owned()
    } else {
        base
    }
}

/// Composes a `multipart/mixed` message: plain-text body, then one
/// `application/octet-stream` part per file.
pub fn build_message(sender: &str, email: &OutgoingEmail) -> Result<Message, SendFailure> {
    let from: Mailbox = sender
        .parse()
        .map_err(|e| SendFailure::Compose(format!("sender {sender}: {e}")))?;
    let to: Mailbox = email
        .receiver_email
        .parse()
        .map_err(|e| SendFailure::Compose(format!("receiver {}: {e}", email.receiver_email)))?;

    let mut subject = email.subject.clone();
    subject.retain(|c| c != '\r' && c != '\n');

    let mut mixed = MultiPart::mixed().singlepart(SinglePart::plain(email.body.clone()));
    if !email.file_paths.is_empty() {
        tracing::debug!(count = email.file_paths.len(), "attaching files");
    }
    for path in &email.file_paths {
        let bytes = std::fs::read(path).map_err(|e| SendFailure::Attachment {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        // non-ASCII names are RFC 2231 encoded by lettre
        let part = Attachment::new(attachment_filename(path))
            .body(bytes, ContentType::parse("application/octet-stream").map_err(|e| SendFailure::Compose(e.to_string()))?);
        mixed = mixed.singlepart(part);
    }

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .multipart(mixed)
        .map_err(|e| SendFailure::Compose(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;

    fn email(files: Vec<String>) -> OutgoingEmail {
        OutgoingEmail {
            receiver_email: "a@example.com".into(),
            subject: "Q1 report".into(),
            body: "see attached".into(),
            file_paths: files,
        }
    }

    fn settings(port: u16) -> SmtpSettings {
        SmtpSettings {
            host: "127.0.0.1".into(),
            port,
            sender_email: "sender@example.com".into(),
            password: "secret".into(),
            hello_name: Some("attachmail.test".into()),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn attachment_names_are_decoded() {
        assert_eq!(
            attachment_filename("/srv/uploads/%EB%B3%B4%EA%B3%A0%EC%84%9C.pdf"),
            "보고서.pdf"
        );
        assert_eq!(attachment_filename("uploads/plain_name.txt"), "plain_name.txt");
    }

    #[test]
    fn message_has_body_and_attachment_parts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"attachment body").unwrap();

        let msg = build_message(
            "sender@example.com",
            &email(vec![path.to_string_lossy().into_owned()]),
        )
        .unwrap();
        let raw = String::from_utf8_lossy(&msg.formatted()).into_owned();

        assert!(raw.contains("Content-Type: multipart/mixed"));
        assert!(raw.contains("Subject: Q1 report"));
        assert!(raw.contains("see attached"));
        assert!(raw.contains("application/octet-stream"));
        assert!(raw.contains("notes.txt"));
    }

    #[test]
    fn unreadable_attachment_is_reported() {
        let err = build_message(
            "sender@example.com",
            &email(vec!["/definitely/not/here.bin".into()]),
        )
        .unwrap_err();
        assert!(matches!(err, SendFailure::Attachment { path, .. } if path == "/definitely/not/here.bin"));
    }

    #[test]
    fn rcpt_accepts_forwarding_reply() {
        let reply: Response = "251 User not local; will forward\r\n".parse().unwrap();
        assert_eq!(check_reply(SmtpStage::RcptTo, Ok(reply), &[250, 251]), Ok(()));
    }

    #[test]
    fn unexpected_positive_code_is_a_rejection() {
        let reply: Response = "252 Cannot VRFY user\r\n".parse().unwrap();
        let err = check_reply(SmtpStage::RcptTo, Ok(reply), &[250, 251]).unwrap_err();
        assert_eq!(
            err,
            SendFailure::Rejected {
                stage: SmtpStage::RcptTo,
                code: 252,
                text: "Cannot VRFY user".into(),
            }
        );

        let outcome = SendOutcome::failed("a@example.com", err);
        assert!(!outcome.success);
        assert!(outcome.message.contains("RCPT TO rejected with 252"));
        assert!(outcome.message.contains("Cannot VRFY user"));
    }

    #[tokio::test]
    async fn unreachable_server_becomes_a_failed_outcome() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let outcome = SmtpDispatcher::new(settings(port)).send(email(vec![])).await;

        assert!(!outcome.success);
        assert!(matches!(outcome.failure, Some(SendFailure::Connection(_))));
        assert!(outcome.message.starts_with("Failed to send email to a@example.com"));
    }

    /// Minimal SMTP server on a local port answering each command with
    /// `reply(command)`. Joins to the list of commands it received.
    fn scripted_server(reply: fn(&str) -> &'static str) -> (u16, std::thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut writer = stream.try_clone().unwrap();
            let mut reader = BufReader::new(stream);
            writer.write_all(b"220 test ESMTP\r\n").unwrap();
            let mut seen = Vec::new();
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap_or(0) > 0 {
                let cmd = line.trim_end().to_uppercase();
                writer.write_all(reply(&cmd).as_bytes()).unwrap();
                let quit = cmd.starts_with("QUIT");
                seen.push(cmd);
                if quit {
                    break;
                }
                line.clear();
            }
            seen
        });
        (port, server)
    }

    #[tokio::test]
    async fn server_without_starttls_is_refused_before_auth() {
        let (port, server) = scripted_server(|cmd| {
            if cmd.starts_with("EHLO") {
                "250-test\r\n250 AUTH PLAIN LOGIN\r\n"
            } else if cmd.starts_with("QUIT") {
                "221 bye\r\n"
            } else {
                "500 unexpected\r\n"
            }
        });

        let outcome = SmtpDispatcher::new(settings(port)).send(email(vec![])).await;
        let seen = server.join().unwrap();

        assert!(!outcome.success);
        assert!(matches!(outcome.failure, Some(SendFailure::Tls(_))));
        assert!(seen.iter().all(|c| !c.starts_with("AUTH") && !c.starts_with("MAIL")));
    }

    #[test]
    fn refused_recipient_reports_code_and_reply_text() {
        let (port, server) = scripted_server(|cmd| {
            if cmd.starts_with("EHLO") {
                "250 test\r\n"
            } else if cmd.starts_with("MAIL FROM") {
                "250 2.1.0 Ok\r\n"
            } else if cmd.starts_with("RCPT TO") {
                "550 5.1.1 No such user\r\n"
            } else if cmd.starts_with("QUIT") {
                "221 bye\r\n"
            } else {
                "500 unexpected\r\n"
            }
        });

        let hello = ClientId::Domain("attachmail.test".into());
        let mut conn = SmtpConnection::connect(
            ("127.0.0.1", port),
            Some(Duration::from_secs(5)),
            &hello,
            None,
            None,
        )
        .unwrap();
        let from: Address = "sender@example.com".parse().unwrap();
        let to: Address = "ghost@example.com".parse().unwrap();

        check_reply(
            SmtpStage::MailFrom,
            conn.command(Mail::new(Some(from), vec![])),
            &[250],
        )
        .unwrap();
        let err = check_reply(
            SmtpStage::RcptTo,
            conn.command(Rcpt::new(to, vec![])),
            &[250, 251],
        )
        .unwrap_err();
        conn.quit().ok();
        server.join().unwrap();

        assert_eq!(
            err,
            SendFailure::Rejected {
                stage: SmtpStage::RcptTo,
                code: 550,
                text: "5.1.1 No such user".into(),
            }
        );
        let outcome = SendOutcome::failed("ghost@example.com", err);
        assert_eq!(
            outcome.message,
            "Failed to send email to ghost@example.com: RCPT TO rejected with 550: 5.1.1 No such user"
        );
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        // accepted by the kernel backlog, never greeted
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut settings = settings(port);
        settings.timeout = Duration::from_secs(1);

        let started = std::time::Instant::now();
        let outcome = SmtpDispatcher::new(settings).send(email(vec![])).await;
        let elapsed = started.elapsed();
        drop(listener);

        assert!(!outcome.success);
        assert_eq!(outcome.failure, Some(SendFailure::Timeout(Duration::from_secs(1))));
        assert!(outcome.message.ends_with("timed out after 1s"), "{}", outcome.message);
        assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");
    }
}
