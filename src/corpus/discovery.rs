//! Corpus discovery — lazy walk of the data directory
//!
//! Yields one `SourceArtifact` per file whose extension is allow-listed.
//! Identifiers are corpus-relative paths with `/` separators, so the same
//! file gets the same identifier on every run and on every platform.

use crate::artifact::{meta_keys, SourceArtifact};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Source file extensions ingested by default.
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "py", "java", "c", "cpp", "js", "ts", "html", "css", "rb", "php", "swift", "go", "rs", "kt",
    "kts", "sql", "sh", "r", "hs", "pl",
];

/// Errors raised while discovering a single file
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DiscoveryError {
    /// The path the error concerns.
    pub fn path(&self) -> &Path {
        match self {
            DiscoveryError::Walk { path, .. } | DiscoveryError::Read { path, .. } => path,
        }
    }
}

/// A directory of reference repositories.
#[derive(Debug, Clone)]
pub struct CorpusSource {
    root: PathBuf,
    extensions: HashSet<String>,
}

impl CorpusSource {
    /// Create a source over `root`, accepting the given extensions
    /// (case-insensitive, with or without a leading dot).
    pub fn new<I, S>(root: impl Into<PathBuf>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            root: root.into(),
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn with_default_extensions(root: impl Into<PathBuf>) -> Self {
        Self::new(root, DEFAULT_EXTENSIONS.iter().copied())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| self.extensions.contains(&e.to_lowercase()))
    }

    /// Lazily enumerate artifacts. Unreadable files surface as `Err` items
    /// and do not end the walk. `.git` directories are skipped.
    pub fn artifacts(&self) -> impl Iterator<Item = Result<SourceArtifact, DiscoveryError>> + '_ {
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git")
            .filter_map(move |entry| match entry {
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    Some(Err(DiscoveryError::Walk { path, source: err }))
                }
                Ok(entry) if entry.file_type().is_file() && self.accepts(entry.path()) => {
                    Some(self.load(entry.path()))
                }
                Ok(_) => None,
            })
    }

    fn load(&self, path: &Path) -> Result<SourceArtifact, DiscoveryError> {
        let bytes = std::fs::read(path).map_err(|source| DiscoveryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        // invalid UTF-8 is replaced rather than rejected
        let text = String::from_utf8_lossy(&bytes).into_owned();

        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let components: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let id = components.join("/");

        let mut artifact = SourceArtifact::new(id.clone(), text).with_metadata(meta_keys::PATH, id);
        if components.len() > 1 {
            artifact = artifact.with_metadata(meta_keys::REPOSITORY, components[0].clone());
        }
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            artifact = artifact.with_metadata(meta_keys::EXTENSION, ext.to_lowercase());
        }
        Ok(artifact)
    }
}
