//! HTTP surface binding the relay handlers to routes

mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::client::build_http_client;
use crate::config::AppConfig;
use crate::host::UserStore;

pub use handlers::USER_ID_HEADER;

/// Shared state for the relay
#[derive(Clone)]
pub struct RelayState {
    pub config: Arc<AppConfig>,
    pub http_client: reqwest::Client,
    pub store: Arc<dyn UserStore>,
}

/// Build the router; exposed separately so tests can serve it on any listener
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/models", get(handlers::list_models))
        .route("/chat/completions", post(handlers::chat_completions))
        .route(
            "/tools/enable_model_access",
            post(handlers::enable_model_access),
        )
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the relay server
pub async fn run_server(
    config: AppConfig,
    store: Arc<dyn UserStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let http_client = build_http_client(&config)?;

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let state = RelayState {
        config: Arc::new(config),
        http_client,
        store,
    };
    let backend = state.config.backend.base_url().to_string();
    let broker = state.config.broker.token_url.clone();

    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("broker-relay listening on {}", addr);
    tracing::info!(backend = %backend, broker = %broker, "Relaying chat completions");

    Ok(axum::serve(listener, router(state)).await?)
}
