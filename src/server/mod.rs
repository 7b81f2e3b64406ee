//! HTTP service — exposes the pipeline over axum
//!
//! Routes:
//!   POST /check_plagiarism  `{"code_snippet": str, "k"?: int}`
//!   GET  /health

mod error;
pub mod handlers;

pub use error::{ApiError, ErrorBody};
pub use handlers::HealthResponse;

use crate::index::VectorIndex;
use crate::pipeline::PlagiarismPipeline;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Room for the JSON envelope and the optional `k` around the snippet.
const BODY_ENVELOPE_BYTES: usize = 64 * 1024;

/// Largest request body that can carry a snippet of `max_input_chars`:
/// a char escaped as `\uXXXX` takes six bytes.
pub fn body_limit(max_input_chars: usize) -> usize {
    max_input_chars
        .saturating_mul(6)
        .saturating_add(BODY_ENVELOPE_BYTES)
}

/// Shared application state; cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<PlagiarismPipeline>,
    pub index: Arc<VectorIndex>,
    /// Request body cap, derived from the embedder's input limit
    pub body_limit: usize,
}

impl AppState {
    pub fn new(pipeline: Arc<PlagiarismPipeline>) -> Self {
        let index = pipeline.retriever().index().clone();
        let body_limit = body_limit(pipeline.retriever().max_input_chars());
        Self {
            pipeline,
            index,
            body_limit,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let limit = state.body_limit;
    Router::new()
        .route("/check_plagiarism", post(handlers::check_plagiarism))
        .route("/check_plagiarism/", post(handlers::check_plagiarism))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until ctrl-c.
pub async fn serve(state: AppState, addr: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await
}
