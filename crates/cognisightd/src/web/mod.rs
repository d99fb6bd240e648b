pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ui;

use crate::config::Config;
use crate::controller::Controller;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Headroom over the photo limit for the other form fields and multipart framing.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("invalid bind address {addr}: {source}")]
    InvalidAddr {
        addr: String,
        source: std::net::AddrParseError,
    },
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(std::io::Error),
}

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<Controller>,
    pub model_path: String,
    /// Bearer token guarding `GET /api/ledger`.
    pub admin_token: Option<String>,
}

pub fn router(state: AppState, config: &Config) -> Router {
    let body_limit = config.max_upload_bytes + FORM_OVERHEAD_BYTES;

    let mut app = Router::new()
        .route("/", get(ui::index_handler))
        .route("/api/validate", post(handlers::validate_handler))
        .route("/api/predict", post(handlers::predict_handler))
        .route("/health", get(handlers::health_handler));
    if state.admin_token.is_some() {
        app = app.route("/api/ledger", get(handlers::ledger_handler));
    } else {
        tracing::info!("no admin token configured; /api/ledger disabled");
    }

    app.layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TimeoutLayer::new(config.server_timeout()))
        .layer(axum::middleware::from_fn(middleware::request_tracing))
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    config: &Config,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServeError> {
    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .map_err(|source| ServeError::InvalidAddr {
            addr: config.bind_addr.clone(),
            source,
        })?;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServeError::Bind { addr, source })?;

    tracing::info!(addr = %addr, "listening on http://{addr}");

    axum::serve(listener, router(state, config))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServeError::Serve)
}
