//! Errors raised while saving or loading snapshots and reports.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IoError {
    /// A value could not be turned into JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Failed {action} {path:?}: {source}")]
    FileSystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input that is not valid JSON for the expected document.
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Gzip stream for {path:?} could not be finished: {source}")]
    Compression {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Well-formed input that cannot be a saved state (empty file, no particles).
    #[error("Invalid document: {0}")]
    Validation(String),

    #[error("Nothing saved at {0:?}")]
    NotFound(PathBuf),

    #[error("{context}: {source}")]
    Context {
        context: String,
        source: Box<IoError>,
    },
}

pub type Result<T> = std::result::Result<T, IoError>;

impl IoError {
    /// Builds a `map_err` adapter for a filesystem call on `path`.
    pub fn fs(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| Self::FileSystem {
            action,
            path,
            source,
        }
    }

    #[must_use]
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    #[must_use]
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }
}
