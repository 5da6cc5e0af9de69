use std::sync::Arc;

use anyhow::{Context, Result};

use attachmail::smtp::SmtpDispatcher;
use attachmail::{db, telemetry, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let config = Config::from_env().context("loading configuration")?;
    tracing::info!(
        smtp_host = %config.smtp.host,
        smtp_port = config.smtp.port,
        sender = %config.smtp.sender_email,
        password = "********",
        upload_dir = %config.upload_dir.display(),
        origins = ?config.allowed_origins,
        "configuration loaded"
    );

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .with_context(|| format!("creating upload directory {}", config.upload_dir.display()))?;

    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool, &config.migrations_dir).await?;

    let dispatcher = Arc::new(SmtpDispatcher::new(config.smtp.clone()));
    let port = config.port;
    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config),
        dispatcher,
    };
    let app = attachmail::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let term = async {
        if let Ok(mut s) = signal::unix::signal(signal::unix::SignalKind::terminate()) {
            s.recv().await;
        }
    };
    #[cfg(not(unix))]
    let term = std::future::pending::<()>();
    tokio::select! { _ = ctrl_c => {}, _ = term => {} }
    tracing::info!("shutting down");
}
