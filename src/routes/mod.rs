use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::config::AllowedOrigins;
use crate::AppState;

pub mod addresses;
pub mod files;
pub mod history;
pub mod send;
pub mod upload;

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "healthy"}))
}

fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS];
    match origins {
        AllowedOrigins::Any => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any),
        AllowedOrigins::List(list) => {
            let values: Vec<HeaderValue> = list
                .iter()
                .filter_map(|o| HeaderValue::from_str(o.trim_end_matches('/')).ok())
                .collect();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(values))
                .allow_methods(methods)
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
                .allow_credentials(true)
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload::upload_files))
        .route("/send-email", post(send::send_email))
        .route("/email-history", get(history::email_history))
        .route(
            "/addresses",
            get(addresses::list_addresses).post(addresses::create_address),
        )
        .route("/active-addresses", get(addresses::list_active_addresses))
        .route(
            "/addresses/:id",
            put(addresses::update_address).delete(addresses::delete_address),
        )
        .route("/files", get(files::list_files).delete(files::delete_files));

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(cors_layer(&state.config.allowed_origins))
        .with_state(state)
}
