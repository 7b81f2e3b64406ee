//! End-to-end pipeline scenarios: retrieval, verification and the
//! degenerate no-match path, driven through `PlagiarismPipeline::handle`.
//!
//! Run with: `cargo test --test pipeline_scenarios`

mod common;

use codematch::{
    CheckOutcome, CheckRequest, Embedder, ErrorKind, ScriptedOracle, Verdict, VectorIndex,
};
use common::{ADD_SNIPPET, MULTIPLY_SNIPPET, UNRELATED_SOURCES};
use std::sync::Arc;
use std::time::Duration;

fn corpus_with_add() -> Vec<(&'static str, &'static str)> {
    let mut sources = vec![("repoA/math.py", ADD_SNIPPET)];
    sources.extend_from_slice(UNRELATED_SOURCES);
    sources
}

// ============================================================================
// Scenario: empty index
// ============================================================================

#[tokio::test]
async fn empty_index_returns_no_match_without_calling_oracle() {
    let embedder = common::embedder();
    let index = Arc::new(VectorIndex::in_memory(common::DIMENSIONS));
    let oracle = Arc::new(ScriptedOracle::replying("Yes"));
    let pipeline = common::pipeline(embedder, index, oracle.clone(), Duration::from_secs(1));

    for snippet in [ADD_SNIPPET, MULTIPLY_SNIPPET, "x"] {
        let outcome = pipeline.handle(&CheckRequest::new(snippet)).await.unwrap();
        assert_eq!(outcome, CheckOutcome::NoMatch);

        let json = serde_json::to_value(outcome.into_response()).unwrap();
        assert_eq!(json, serde_json::json!({"plagiarism": "no similar code found"}));
    }
    assert_eq!(oracle.call_count(), 0, "oracle must not be consulted");
}

// ============================================================================
// Scenario: copied function
// ============================================================================

#[tokio::test]
async fn identical_function_is_reported_as_plagiarism() {
    let embedder = common::embedder();
    let index = common::index_with(&embedder, &corpus_with_add());
    let oracle = Arc::new(ScriptedOracle::replying("Yes"));
    let pipeline = common::pipeline(embedder, index, oracle.clone(), Duration::from_secs(1));

    let outcome = pipeline.handle(&CheckRequest::new(ADD_SNIPPET)).await.unwrap();
    let record = match &outcome {
        CheckOutcome::Verified(record) => record,
        CheckOutcome::NoMatch => panic!("expected candidates"),
    };

    let top = record.matches.top().unwrap();
    assert_eq!(top.id, "repoA/math.py");
    assert!((top.score - 1.0).abs() < 1e-4, "self-similarity {}", top.score);
    assert_eq!(record.matches.len(), 3);
    assert_eq!(record.verdict, Verdict::Plagiarism);
    assert_eq!(record.raw_response, "Yes");

    // the prompt carries the snippet and the top candidate
    let prompt = oracle.last_prompt().unwrap();
    assert!(prompt.contains(ADD_SNIPPET));
    assert!(prompt.contains("repoA/math.py"));

    let json = serde_json::to_value(outcome.into_response()).unwrap();
    assert_eq!(json["plagiarism"], "Yes");
    let similar = json["similar_files"].as_array().unwrap();
    assert_eq!(similar.len(), 3);
    assert_eq!(similar[0]["path"], "repoA/math.py");
    assert_eq!(similar[0]["repository"], "repoA");
}

// ============================================================================
// Scenario: original function against a non-empty index
// ============================================================================

#[tokio::test]
async fn weak_matches_still_go_to_the_oracle() {
    let embedder = common::embedder();
    let index = common::index_with(&embedder, UNRELATED_SOURCES);
    let oracle = Arc::new(ScriptedOracle::replying("No"));
    let pipeline = common::pipeline(embedder, index, oracle.clone(), Duration::from_secs(1));

    let outcome = pipeline.handle(&CheckRequest::new(MULTIPLY_SNIPPET)).await.unwrap();
    assert_eq!(oracle.call_count(), 1);

    let response = outcome.into_response();
    assert_eq!(response.plagiarism, "No");
    assert_eq!(response.similar_files.map(|f| f.len()), Some(3));
}

#[tokio::test]
async fn free_text_answers_never_leak_into_the_verdict() {
    let embedder = common::embedder();
    let index = common::index_with(&embedder, &corpus_with_add());
    let oracle = Arc::new(ScriptedOracle::replying(
        "It looks quite similar, possibly copied.",
    ));
    let pipeline = common::pipeline(embedder, index, oracle, Duration::from_secs(1));

    let response = pipeline
        .handle(&CheckRequest::new(ADD_SNIPPET))
        .await
        .unwrap()
        .into_response();
    assert_eq!(response.plagiarism, "No");
}

// ============================================================================
// Scenario: oracle failures
// ============================================================================

#[tokio::test]
async fn oracle_timeout_fails_with_oracle_unavailable() {
    let embedder = common::embedder();
    let index = common::index_with(&embedder, &[("repoA/math.py", ADD_SNIPPET)]);
    let oracle = Arc::new(ScriptedOracle::replying("Yes").with_delay(Duration::from_secs(5)));
    let pipeline = common::pipeline(embedder, index, oracle, Duration::from_millis(50));

    let err = pipeline
        .handle(&CheckRequest::new(ADD_SNIPPET))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OracleUnavailable);
    assert_eq!(err.kind().as_str(), "OracleUnavailableError");
}

#[tokio::test]
async fn transport_failure_is_distinct_from_negative_verdict() {
    let embedder = common::embedder();
    let index = common::index_with(&embedder, &[("repoA/math.py", ADD_SNIPPET)]);
    let oracle = Arc::new(ScriptedOracle::failing("connection reset"));
    let pipeline = common::pipeline(embedder, index, oracle, Duration::from_secs(1));

    let err = pipeline
        .handle(&CheckRequest::new(ADD_SNIPPET))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OracleUnavailable);
}

// ============================================================================
// Scenario: invalid input
// ============================================================================

#[tokio::test]
async fn blank_snippet_is_invalid_input() {
    let embedder = common::embedder();
    let index = common::index_with(&embedder, &[("repoA/math.py", ADD_SNIPPET)]);
    let oracle = Arc::new(ScriptedOracle::replying("Yes"));
    let pipeline = common::pipeline(embedder, index, oracle.clone(), Duration::from_secs(1));

    let err = pipeline.handle(&CheckRequest::new(" \n\t")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(oracle.call_count(), 0);
}

// ============================================================================
// Scenario: concurrent requests during ingestion
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn requests_proceed_while_corpus_is_being_written() {
    let embedder = common::embedder();
    let index = common::index_with(&embedder, &[("repoA/math.py", ADD_SNIPPET)]);
    let oracle = Arc::new(ScriptedOracle::replying("Yes"));
    let pipeline = Arc::new(common::pipeline(
        embedder.clone(),
        index.clone(),
        oracle.clone(),
        Duration::from_secs(5),
    ));

    let writer = {
        let index = index.clone();
        let embedder = embedder.clone();
        tokio::task::spawn_blocking(move || {
            for i in 0..200 {
                let id = format!("repoZ/gen_{}.py", i);
                let text = format!("def f{}(x): return x + {}", i, i);
                let vector = embedder.embed(&text).unwrap();
                index.upsert(&id, vector, common::metadata_for(&id)).unwrap();
            }
        })
    };

    let mut requests = Vec::new();
    for _ in 0..16 {
        let pipeline = pipeline.clone();
        requests.push(tokio::spawn(async move {
            pipeline.handle(&CheckRequest::new(ADD_SNIPPET)).await
        }));
    }

    for request in requests {
        let outcome = request.await.unwrap().unwrap();
        match outcome {
            CheckOutcome::Verified(record) => {
                assert_eq!(record.matches.top().unwrap().id, "repoA/math.py");
                let scores: Vec<f32> = record.matches.iter().map(|m| m.score).collect();
                assert!(scores.windows(2).all(|w| w[0] >= w[1]));
            }
            CheckOutcome::NoMatch => panic!("index was never empty"),
        }
    }
    writer.await.unwrap();
    assert_eq!(index.len(), 201);
    assert_eq!(oracle.call_count(), 16);
}
