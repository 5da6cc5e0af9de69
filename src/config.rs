use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is not a valid number: {value}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("invalid URL in ALLOWED_ORIGIN_URLS: {0}")]
    InvalidOrigin(String),
}

/// Origins accepted by the CORS layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl AllowedOrigins {
    /// Parses a comma separated list. The literal `all` anywhere in the list
    /// turns the whole setting into a wildcard.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();

        if origins.iter().any(|o| o == "all") {
            return Ok(Self::Any);
        }

        for origin in &origins {
            let parsed =
                url::Url::parse(origin).map_err(|_| ConfigError::InvalidOrigin(origin.clone()))?;
            if parsed.host_str().is_none() {
                return Err(ConfigError::InvalidOrigin(origin.clone()));
            }
        }
        Ok(Self::List(origins))
    }
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub sender_email: String,
    pub password: String,
    pub hello_name: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub migrations_dir: PathBuf,
    pub smtp: SmtpSettings,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub allowed_origins: AllowedOrigins,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = var_or("DATABASE_URL", "sqlite://attachmail.db");
        let migrations_dir = PathBuf::from(var_or("MIGRATIONS_DIR", "migrations"));

        let smtp_host = env::var("SMTP_SERVER")
            .or_else(|_| env::var("SMTP_HOST"))
            .unwrap_or_else(|_| "smtp.gmail.com".into());
        let smtp_port = parse_var("SMTP_PORT", 587u16)?;
        let sender_email = env::var("SMTP_EMAIL").map_err(|_| ConfigError::Missing("SMTP_EMAIL"))?;
        let smtp_password =
            env::var("SMTP_PASSWORD").map_err(|_| ConfigError::Missing("SMTP_PASSWORD"))?;
        // App passwords are often pasted as "abcd efgh ijkl mnop"
        let smtp_password: String = smtp_password.chars().filter(|c| !c.is_whitespace()).collect();
        let hello_name = env::var("SMTP_HELLO_NAME").ok().filter(|v| !v.trim().is_empty());
        let timeout_secs = parse_var("SMTP_TIMEOUT_SECS", 10u64)?;

        let upload_dir = PathBuf::from(var_or("UPLOAD_FOLDER", "uploads"));
        let max_upload_bytes = parse_var("MAX_CONTENT_LENGTH", 16 * 1024 * 1024usize)?;
        let allowed_origins = AllowedOrigins::parse(&var_or("ALLOWED_ORIGIN_URLS", ""))?;
        let port = parse_var("BACKEND_PORT", 5000u16)?;

        Ok(Config {
            database_url,
            migrations_dir,
            smtp: SmtpSettings {
                host: smtp_host,
                port: smtp_port,
                sender_email,
                password: smtp_password,
                hello_name,
                timeout: Duration::from_secs(timeout_secs),
            },
            upload_dir,
            max_upload_bytes,
            allowed_origins,
            port,
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
        _ => Ok(default),
    }
}
