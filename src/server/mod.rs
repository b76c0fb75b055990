//! HTTP server exposing the analysis and posting endpoints.
//!
//! - `POST /api/analyze`: multipart `media`, `issueText`, `location`
//! - `POST /api/tweet`: multipart `tweet`, `media`
//! - `GET /api/verify-gemini` and `GET /api/verify-twitter`: credential checks

mod error;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::analysis::Analyzer;
use crate::social::TwitterClient;

pub use error::{ApiError, LogErr};

/// Largest accepted upload (50 MB).
pub const DEFAULT_BODY_LIMIT: usize = 50 * 1024 * 1024;

/// Shared state for all handlers.
#[derive(Debug)]
pub struct AppState {
    pub analyzer: Analyzer,
    pub twitter: Option<TwitterClient>,
}

impl AppState {
    pub fn new(analyzer: Analyzer, twitter: Option<TwitterClient>) -> Self {
        if twitter.is_none() {
            log::warn!("X_ACCESS_TOKEN is not set. Posting will be unavailable.");
        }
        Self { analyzer, twitter }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Build the application router.
pub fn router(state: Arc<AppState>, body_limit: usize) -> Router {
    routes::routes()
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>, body_limit: usize) -> Result<(), ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    serve_on(listener, state, body_limit).await
}

/// Serve on an already-bound listener.
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    state: Arc<AppState>,
    body_limit: usize,
) -> Result<(), ServerError> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("Listening on http://{}", addr);
    }
    axum::serve(listener, router(state, body_limit)).await?;
    Ok(())
}
