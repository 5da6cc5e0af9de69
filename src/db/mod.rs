use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Opens the pool, creating the database file when it does not exist yet.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let url = normalize_sqlite_url(database_url);
    if let Some(path) = db_file_path(&url) {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }
    }

    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);
    // an in-memory database only lives as long as its single connection
    let max_connections = if db_file_path(&url).is_none() { 1 } else { 5 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    Ok(pool)
}

/// Applies every `.sql` file in `dir`, ordered by file name.
pub async fn run_migrations(pool: &SqlitePool, dir: &Path) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("reading migrations from {}", dir.display()))?
        .filter_map(|e| e.ok())
        .collect();
    entries.sort_by_key(|e| e.path());
    for e in entries {
        let p = e.path();
        if p.extension().and_then(|s| s.to_str()) == Some("sql") {
            let sql = std::fs::read_to_string(&p)?;
            sqlx::query(&sql)
                .execute(pool)
                .await
                .with_context(|| format!("migration {}", p.display()))?;
            tracing::debug!(migration = %p.display(), "applied");
        }
    }
    Ok(())
}

pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn normalize_sqlite_url(input: &str) -> String {
    // Accept forms: sqlite:foo.db, sqlite://foo.db, file:foo.db, or a bare path
    if input.starts_with("sqlite://") || input.starts_with("sqlite::memory:") {
        return input.to_string();
    }
    if let Some(rest) = input.strip_prefix("sqlite:") {
        return format!("sqlite://{}", rest.trim_start_matches('/'));
    }
    if let Some(rest) = input.strip_prefix("file:") {
        return format!("sqlite://{}", rest);
    }
    format!("sqlite://{}", input)
}

fn db_file_path(url: &str) -> Option<PathBuf> {
    let rest = url.strip_prefix("sqlite://")?;
    if rest.is_empty() || rest.starts_with(":memory:") {
        return None;
    }
    Some(PathBuf::from(rest.split('?').next().unwrap_or(rest)))
}
