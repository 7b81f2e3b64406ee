//! Verification oracle — external text completion asked for a final yes/no
//! judgement on retrieved candidates.
//!
//! The `Oracle` trait is prompt in, text out. Response-shape handling stays
//! inside each transport; verdict parsing lives in `Verifier`.
//! Implementations:
//! - `OpenAiOracle`: OpenAI-compatible chat completions over HTTP (production)
//! - `ScriptedOracle`: preconfigured replies, failures and delays (testing, offline runs)

mod openai;
mod scripted;
mod verifier;

pub use openai::OpenAiOracle;
pub use scripted::ScriptedOracle;
pub use verifier::{
    build_prompt, parse_verdict, Verdict, Verification, Verifier, VERDICT_INSTRUCTION,
};

use async_trait::async_trait;
use std::time::Duration;

/// Errors from oracle calls. Every variant means "no verdict was obtained";
/// none of them is ever turned into a negative verdict.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle not configured: {0}")]
    NotConfigured(String),
    #[error("oracle transport failed: {0}")]
    Transport(String),
    #[error("oracle did not answer within {0:?}")]
    Timeout(Duration),
    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed oracle response: {0}")]
    MalformedResponse(String),
}

/// A single-shot text completion service.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Send `prompt`, return the completion text.
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;
}
