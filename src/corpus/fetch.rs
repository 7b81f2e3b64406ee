//! Repository acquisition — shallow `git clone` into the data directory
//!
//! A repository whose target directory already exists is left alone; there
//! is no pull or update. Each repository succeeds or fails on its own.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("cannot derive a directory name from repository url '{0}'")]
    InvalidUrl(String),

    #[error("failed to prepare {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run git for {url}: {source}")]
    Spawn {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("git clone of {url} failed: {stderr}")]
    CloneFailed { url: String, stderr: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Cloned(PathBuf),
    AlreadyPresent(PathBuf),
}

/// Directory name for a repository url: its last path segment without `.git`.
pub fn repo_name(url: &str) -> Option<String> {
    let name = url
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()?
        .trim_end_matches(".git");
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

/// Clone `url` into `data_dir/<repo_name>` unless that directory exists.
pub async fn fetch_repository(url: &str, data_dir: &Path) -> Result<FetchOutcome, FetchError> {
    let name = repo_name(url).ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;
    let target = data_dir.join(&name);

    let present = tokio::fs::try_exists(&target)
        .await
        .map_err(|source| FetchError::Io {
            path: target.clone(),
            source,
        })?;
    if present {
        info!(repository = %name, "repository already present");
        return Ok(FetchOutcome::AlreadyPresent(target));
    }

    tokio::fs::create_dir_all(data_dir)
        .await
        .map_err(|source| FetchError::Io {
            path: data_dir.to_path_buf(),
            source,
        })?;

    info!(url, target = %target.display(), "cloning repository");
    let output = Command::new("git")
        .args(["clone", "--depth", "1", "--quiet", url])
        .arg(&target)
        .output()
        .await
        .map_err(|source| FetchError::Spawn {
            url: url.to_string(),
            source,
        })?;

    if !output.status.success() {
        return Err(FetchError::CloneFailed {
            url: url.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(FetchOutcome::Cloned(target))
}

/// Fetch every repository, reporting each outcome. One failure does not
/// stop the rest.
pub async fn fetch_repositories(
    urls: &[String],
    data_dir: &Path,
) -> Vec<(String, Result<FetchOutcome, FetchError>)> {
    let mut outcomes = Vec::with_capacity(urls.len());
    for url in urls {
        let outcome = fetch_repository(url, data_dir).await;
        if let Err(e) = &outcome {
            warn!(url = %url, error = %e, "repository fetch failed");
        }
        outcomes.push((url.clone(), outcome));
    }
    outcomes
}
