//! HTTP API tests: status codes and JSON bodies for verdicts and failures.
//! Each test builds its own router over in-memory state.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use codematch::server::{create_router, AppState, ErrorBody, HealthResponse};
use codematch::{CheckResponse, Embedder, HashingEmbedder, ScriptedOracle, VectorIndex};
use common::{ADD_SNIPPET, UNRELATED_SOURCES};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

// =============================================================================
// Helpers
// =============================================================================

fn make_app(oracle: ScriptedOracle, populated: bool) -> axum::Router {
    let embedder = common::embedder();
    let index = if populated {
        let mut sources = vec![("repoA/math.py", ADD_SNIPPET)];
        sources.extend_from_slice(UNRELATED_SOURCES);
        common::index_with(&embedder, &sources)
    } else {
        Arc::new(VectorIndex::in_memory(common::DIMENSIONS))
    };
    let pipeline = common::pipeline(embedder, index, Arc::new(oracle), Duration::from_millis(200));
    create_router(AppState::new(Arc::new(pipeline)))
}

/// Empty index behind an embedder that accepts `max_input_chars`.
fn make_app_with_input_limit(max_input_chars: usize) -> axum::Router {
    let embedder: Arc<dyn Embedder> =
        Arc::new(HashingEmbedder::new(common::DIMENSIONS).with_max_input_chars(max_input_chars));
    let index = Arc::new(VectorIndex::in_memory(common::DIMENSIONS));
    let oracle = Arc::new(ScriptedOracle::replying("Yes"));
    let pipeline = common::pipeline(embedder, index, oracle, Duration::from_millis(200));
    create_router(AppState::new(Arc::new(pipeline)))
}

fn post_json(uri: &str, json: &str) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(json.to_string()))
        .unwrap()
}

async fn body_bytes(resp: axum::response::Response) -> Vec<u8> {
    axum::body::to_bytes(resp.into_body(), 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(resp: axum::response::Response) -> Value {
    serde_json::from_slice(&body_bytes(resp).await).unwrap()
}

// =============================================================================
// POST /check_plagiarism
// =============================================================================

#[tokio::test]
async fn check_returns_verdict_and_similar_files() {
    let app = make_app(ScriptedOracle::replying("Yes"), true);
    let resp = app
        .oneshot(post_json(
            "/check_plagiarism",
            &serde_json::json!({ "code_snippet": ADD_SNIPPET }).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: CheckResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body.plagiarism, "Yes");
    let similar = body.similar_files.unwrap();
    assert_eq!(similar.len(), 3);
    assert_eq!(similar[0].get("path").map(String::as_str), Some("repoA/math.py"));
}

#[tokio::test]
async fn check_honours_k_override() {
    let app = make_app(ScriptedOracle::replying("No"), true);
    let resp = app
        .oneshot(post_json(
            "/check_plagiarism",
            r#"{"code_snippet": "def multiply(a, b): return a * b", "k": 1}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["plagiarism"], "No");
    assert_eq!(json["similar_files"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_index_omits_similar_files() {
    let app = make_app(ScriptedOracle::replying("Yes"), false);
    let resp = app
        .oneshot(post_json("/check_plagiarism/", r#"{"code_snippet": "x = 1"}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json, serde_json::json!({"plagiarism": "no similar code found"}));
}

#[tokio::test]
async fn blank_snippet_is_bad_request() {
    let app = make_app(ScriptedOracle::replying("Yes"), true);
    let resp = app
        .oneshot(post_json("/check_plagiarism", r#"{"code_snippet": "   "}"#))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body.error, "InvalidInputError");
}

#[tokio::test]
async fn malformed_body_is_bad_request() {
    for payload in [r#"{"snippet": "x = 1"}"#, "not json", r#"{"code_snippet": 42}"#] {
        let app = make_app(ScriptedOracle::replying("Yes"), true);
        let resp = app
            .oneshot(post_json("/check_plagiarism", payload))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "payload {:?}", payload);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "InvalidInputError");
    }
}

#[tokio::test]
async fn oracle_timeout_is_bad_gateway_without_verdict() {
    let oracle = ScriptedOracle::replying("Yes").with_delay(Duration::from_secs(5));
    let app = make_app(oracle, true);
    let resp = app
        .oneshot(post_json(
            "/check_plagiarism",
            &serde_json::json!({ "code_snippet": ADD_SNIPPET }).to_string(),
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "OracleUnavailableError");
    assert!(json.get("plagiarism").is_none());
}

#[tokio::test]
async fn body_limit_follows_embedder_input_limit() {
    // larger than any fixed default, within the configured input limit
    let snippet = "x = 1\n".repeat(900_000);
    assert!(snippet.len() > 5 * 1024 * 1024);

    let app = make_app_with_input_limit(6_000_000);
    let resp = app
        .oneshot(post_json(
            "/check_plagiarism",
            &serde_json::json!({ "code_snippet": snippet }).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let json = body_json(resp).await;
    assert_eq!(json["plagiarism"], "no similar code found");
}

#[tokio::test]
async fn body_beyond_input_limit_is_bad_request() {
    let snippet = "y".repeat(200_000);
    let app = make_app_with_input_limit(100);
    let resp = app
        .oneshot(post_json(
            "/check_plagiarism",
            &serde_json::json!({ "code_snippet": snippet }).to_string(),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let json = body_json(resp).await;
    assert_eq!(json["error"], "InvalidInputError");
}

// =============================================================================
// GET /health
// =============================================================================

#[tokio::test]
async fn health_reports_index_size() {
    let app = make_app(ScriptedOracle::replying("Yes"), true);
    let resp = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: HealthResponse = serde_json::from_slice(&body_bytes(resp).await).unwrap();
    assert_eq!(body.status, "healthy");
    assert_eq!(body.index_size, 4);
    assert_eq!(body.dimensions, common::DIMENSIONS);
}
