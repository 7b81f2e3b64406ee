//! Verifier — builds the judgement prompt and normalizes the oracle's answer

use super::{Oracle, OracleError};
use crate::index::QueryResult;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Closing instruction of every judgement prompt.
pub const VERDICT_INSTRUCTION: &str = "Is this plagiarism? Respond with 'Yes' or 'No' only.";

/// Binary plagiarism verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Plagiarism,
    NotPlagiarism,
}

impl Verdict {
    /// Verdict string returned to callers.
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Plagiarism => "Yes",
            Verdict::NotPlagiarism => "No",
        }
    }

    pub fn is_plagiarism(&self) -> bool {
        matches!(self, Verdict::Plagiarism)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize oracle text to a verdict.
///
/// Only a first non-empty line reading `yes` (any case, optional trailing
/// `.` or `!`) is affirmative. Everything else, including an empty reply,
/// is negative.
pub fn parse_verdict(response: &str) -> Verdict {
    let first = response
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    let token = first.trim_end_matches(['.', '!']).trim();
    if token.eq_ignore_ascii_case("yes") {
        Verdict::Plagiarism
    } else {
        Verdict::NotPlagiarism
    }
}

/// Build the judgement request for `snippet` and its ranked candidates.
pub fn build_prompt(snippet: &str, candidates: &QueryResult) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are reviewing a code submission for plagiarism.\n\n");
    prompt.push_str("Submitted code:\n```\n");
    prompt.push_str(snippet);
    if !snippet.ends_with('\n') {
        prompt.push('\n');
    }
    prompt.push_str("```\n\n");
    prompt.push_str("Most similar files in the reference corpus:\n");
    for (rank, candidate) in candidates.iter().enumerate() {
        let metadata = serde_json::to_string(&candidate.metadata).unwrap_or_default();
        prompt.push_str(&format!(
            "{}. {} (similarity {:.3}) {}\n",
            rank + 1,
            candidate.id,
            candidate.score,
            metadata
        ));
    }
    prompt.push('\n');
    prompt.push_str(VERDICT_INSTRUCTION);
    prompt
}

/// Normalized verdict plus the oracle's raw text, kept for audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub verdict: Verdict,
    pub raw_response: String,
}

/// Asks an oracle to adjudicate a snippet against its candidates.
pub struct Verifier {
    oracle: Arc<dyn Oracle>,
    timeout: Duration,
}

impl Verifier {
    pub fn new(oracle: Arc<dyn Oracle>, timeout: Duration) -> Self {
        Self { oracle, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// One oracle round trip, bounded by the configured timeout.
    pub async fn verify(
        &self,
        snippet: &str,
        candidates: &QueryResult,
    ) -> Result<Verification, OracleError> {
        let prompt = build_prompt(snippet, candidates);
        debug!(oracle = self.oracle.name(), prompt_len = prompt.len(), "sending judgement request");

        let start = Instant::now();
        let raw_response = tokio::time::timeout(self.timeout, self.oracle.complete(&prompt))
            .await
            .map_err(|_| OracleError::Timeout(self.timeout))??;

        let verdict = parse_verdict(&raw_response);
        info!(
            oracle = self.oracle.name(),
            verdict = %verdict,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "oracle verdict"
        );
        Ok(Verification {
            verdict,
            raw_response,
        })
    }
}
