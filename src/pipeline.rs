//! PlagiarismPipeline — retrieval then verification, one request at a time
//!
//! Per-request states: `Start → Retrieved → Verified`, `Start → NoMatch`, or
//! `Failed` on any stage error. A failure never produces a verdict.
//!
//! `handle` is the single entry point shared by the HTTP server, the CLI and
//! batch evaluation.

use crate::artifact::Metadata;
use crate::embedding::EmbeddingError;
use crate::index::{IndexError, QueryResult};
use crate::oracle::{OracleError, Verdict, Verifier};
use crate::retrieval::{Retrieval, RetrievalError, Retriever};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Number of candidates retrieved when the request does not say.
pub const DEFAULT_TOP_K: usize = 3;

/// Verdict string returned when the index yields no candidates.
pub const NO_MATCH_VERDICT: &str = "no similar code found";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    Retrieved,
    NoMatch,
    Verified,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Start => "start",
            PipelineState::Retrieved => "retrieved",
            PipelineState::NoMatch => "no_match",
            PipelineState::Verified => "verified",
            PipelineState::Failed => "failed",
        }
    }
}

/// User-visible failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Empty or oversized snippet, or a zero `k`. Caller's fault.
    InvalidInput,
    /// Embedding computation failed. Retryable by the caller.
    Embedding,
    /// Index and embedder disagree on vector width. Fatal configuration error.
    DimensionMismatch,
    /// Oracle transport failure, timeout or malformed response.
    OracleUnavailable,
    /// Backing store unavailable.
    IndexIo,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "InvalidInputError",
            ErrorKind::Embedding => "EmbeddingError",
            ErrorKind::DimensionMismatch => "DimensionMismatchError",
            ErrorKind::OracleUnavailable => "OracleUnavailableError",
            ErrorKind::IndexIo => "IndexIOError",
        }
    }

    /// Whether the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Embedding | ErrorKind::OracleUnavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Oracle(#[from] OracleError),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Retrieval(RetrievalError::InvalidInput(_)) => ErrorKind::InvalidInput,
            PipelineError::Retrieval(RetrievalError::Embedding(e)) => match e {
                EmbeddingError::EmptyInput | EmbeddingError::InputTooLong { .. } => {
                    ErrorKind::InvalidInput
                }
                _ => ErrorKind::Embedding,
            },
            PipelineError::Retrieval(RetrievalError::Index(e)) => match e {
                IndexError::DimensionMismatch { .. } | IndexError::ModelMismatch { .. } => {
                    ErrorKind::DimensionMismatch
                }
                IndexError::NonFiniteVector(_) => ErrorKind::Embedding,
                IndexError::Storage(_) => ErrorKind::IndexIo,
            },
            PipelineError::Oracle(_) => ErrorKind::OracleUnavailable,
        }
    }
}

/// Inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub code_snippet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
}

impl CheckRequest {
    pub fn new(code_snippet: impl Into<String>) -> Self {
        Self {
            code_snippet: code_snippet.into(),
            k: None,
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }
}

/// Outbound response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub plagiarism: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similar_files: Option<Vec<Metadata>>,
}

/// Result of a verified request. Not retained after the request completes.
#[derive(Debug, Clone, PartialEq)]
pub struct VerdictRecord {
    pub snippet: String,
    pub matches: QueryResult,
    pub verdict: Verdict,
    pub raw_response: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    NoMatch,
    Verified(VerdictRecord),
}

impl CheckOutcome {
    /// Verdict string as returned to callers.
    pub fn verdict_str(&self) -> &'static str {
        match self {
            CheckOutcome::NoMatch => NO_MATCH_VERDICT,
            CheckOutcome::Verified(record) => record.verdict.as_str(),
        }
    }

    pub fn into_response(self) -> CheckResponse {
        match self {
            CheckOutcome::NoMatch => CheckResponse {
                plagiarism: NO_MATCH_VERDICT.to_string(),
                similar_files: None,
            },
            CheckOutcome::Verified(record) => CheckResponse {
                plagiarism: record.verdict.as_str().to_string(),
                similar_files: Some(record.matches.metadata()),
            },
        }
    }
}

/// Retrieval plus verification, composed once at startup and shared.
pub struct PlagiarismPipeline {
    retriever: Retriever,
    verifier: Verifier,
    default_k: usize,
    max_k: usize,
}

impl PlagiarismPipeline {
    pub fn new(retriever: Retriever, verifier: Verifier) -> Self {
        Self {
            retriever,
            verifier,
            default_k: DEFAULT_TOP_K,
            max_k: usize::MAX,
        }
    }

    /// Set the default `k` and the ceiling a request may ask for.
    pub fn with_k_limits(mut self, default_k: usize, max_k: usize) -> Self {
        self.max_k = max_k.max(1);
        self.default_k = default_k.clamp(1, self.max_k);
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Run one request to a terminal state.
    pub async fn handle(&self, request: &CheckRequest) -> Result<CheckOutcome, PipelineError> {
        let k = request.k.unwrap_or(self.default_k).min(self.max_k);
        debug!(state = PipelineState::Start.as_str(), k, "check requested");

        let outcome = self.run(&request.code_snippet, k).await;
        match &outcome {
            Ok(CheckOutcome::NoMatch) => {
                info!(state = PipelineState::NoMatch.as_str(), "no candidates retrieved");
            }
            Ok(CheckOutcome::Verified(record)) => info!(
                state = PipelineState::Verified.as_str(),
                verdict = %record.verdict,
                top = record.matches.top().map(|m| m.id.as_str()).unwrap_or(""),
                "check complete"
            ),
            Err(e) => warn!(
                state = PipelineState::Failed.as_str(),
                kind = %e.kind(),
                error = %e,
                "check failed"
            ),
        }
        outcome
    }

    async fn run(&self, snippet: &str, k: usize) -> Result<CheckOutcome, PipelineError> {
        let candidates = match self.retriever.retrieve(snippet, k).await? {
            Retrieval::NoMatch => return Ok(CheckOutcome::NoMatch),
            Retrieval::Candidates(candidates) => candidates,
        };
        debug!(
            state = PipelineState::Retrieved.as_str(),
            candidates = candidates.len(),
            "candidates retrieved"
        );

        let verification = self.verifier.verify(snippet, &candidates).await?;
        Ok(CheckOutcome::Verified(VerdictRecord {
            snippet: snippet.to_string(),
            matches: candidates,
            verdict: verification.verdict,
            raw_response: verification.raw_response,
        }))
    }
}
