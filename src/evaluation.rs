//! Batch evaluation — labelled snippets through the same entry point as the
//! HTTP service, with a CSV report

use crate::pipeline::{CheckRequest, PlagiarismPipeline};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("failed to read cases {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid case file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to write report {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A labelled snippet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalCase {
    pub code: String,
    pub expected: String,
}

impl EvalCase {
    pub fn new(code: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            expected: expected.into(),
        }
    }
}

/// One evaluated case. `actual` is the verdict string, or the error kind
/// name when the request failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalResult {
    pub code: String,
    pub expected: String,
    pub actual: String,
}

impl EvalResult {
    pub fn is_correct(&self) -> bool {
        self.actual.eq_ignore_ascii_case(&self.expected)
    }
}

/// The two reference cases: a copied `add` and an original `multiply`.
pub fn default_cases() -> Vec<EvalCase> {
    vec![
        EvalCase::new("def add(a, b): return a + b", "Yes"),
        EvalCase::new("def multiply(a, b): return a * b", "No"),
    ]
}

/// Read cases from a YAML list of `{code, expected}`.
pub fn load_cases(path: &Path) -> Result<Vec<EvalCase>, EvaluationError> {
    let text = std::fs::read_to_string(path).map_err(|source| EvaluationError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&text).map_err(|source| EvaluationError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Run every case, in order. A failed request is recorded, not fatal.
pub async fn evaluate(pipeline: &PlagiarismPipeline, cases: &[EvalCase]) -> Vec<EvalResult> {
    let mut results = Vec::with_capacity(cases.len());
    for case in cases {
        let actual = match pipeline.handle(&CheckRequest::new(case.code.as_str())).await {
            Ok(outcome) => outcome.verdict_str().to_string(),
            Err(e) => {
                warn!(kind = %e.kind(), error = %e, "evaluation case failed");
                e.kind().as_str().to_string()
            }
        };
        results.push(EvalResult {
            code: case.code.clone(),
            expected: case.expected.clone(),
            actual,
        });
    }

    if let Some(acc) = accuracy(&results) {
        info!(cases = results.len(), accuracy = acc, "evaluation complete");
    }
    results
}

/// Fraction of correct results; `None` when there are none.
pub fn accuracy(results: &[EvalResult]) -> Option<f64> {
    if results.is_empty() {
        return None;
    }
    let correct = results.iter().filter(|r| r.is_correct()).count();
    Some(correct as f64 / results.len() as f64)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render results as CSV with header `code,expected,actual`.
pub fn to_csv(results: &[EvalResult]) -> String {
    let mut out = String::from("code,expected,actual\n");
    for r in results {
        out.push_str(&format!(
            "{},{},{}\n",
            csv_field(&r.code),
            csv_field(&r.expected),
            csv_field(&r.actual)
        ));
    }
    out
}

pub fn write_csv(path: &Path, results: &[EvalResult]) -> Result<(), EvaluationError> {
    let to_err = |source: std::io::Error| EvaluationError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(to_err)?;
    }
    let mut file = std::fs::File::create(path).map_err(to_err)?;
    file.write_all(to_csv(results).as_bytes()).map_err(to_err)?;
    Ok(())
}
