use std::sync::Arc;

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod smtp;
pub mod telemetry;

pub use config::Config;

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::SqlitePool,
    pub config: Arc<Config>,
    pub dispatcher: Arc<dyn smtp::Dispatcher>,
}

impl axum::extract::FromRef<AppState> for sqlx::SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<Config> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

/// Builds the HTTP application around `state`.
pub fn app(state: AppState) -> axum::Router {
    routes::router(state)
}
