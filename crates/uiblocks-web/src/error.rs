use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("template {path}: {message}")]
    Template { path: PathBuf, message: String },

    #[error("minify failed: {0}")]
    Minify(String),

    #[error("template cache lock poisoned")]
    CachePoisoned,
}

impl WebError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, WebError>;
