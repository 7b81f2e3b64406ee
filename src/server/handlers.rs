//! Route handlers

use super::error::ApiError;
use super::AppState;
use crate::pipeline::{CheckRequest, CheckResponse};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub index_size: usize,
    pub dimensions: usize,
}

/// POST /check_plagiarism
pub async fn check_plagiarism(
    State(state): State<AppState>,
    payload: Result<Json<CheckRequest>, JsonRejection>,
) -> Result<Json<CheckResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::invalid_input(e.body_text()))?;
    let outcome = state.pipeline.handle(&request).await?;
    Ok(Json(outcome.into_response()))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
        index_size: state.index.len(),
        dimensions: state.index.dimensions(),
    })
}
