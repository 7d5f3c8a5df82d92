// error.rs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Malformed payload at byte {offset}: {message}")]
    Format { offset: usize, message: String },

    #[error("Malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid value for {field}: {message}")]
    Value { field: String, message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest {
        message: String,
        context: String,
        validation_errors: Vec<String>,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("Server error: {status} for {url}")]
    Status { status: u16, url: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("No data found: {0}")]
    NotFound(String),

    #[error("Index {index} out of range for {len} events")]
    Index { index: usize, len: usize },
}

/// Coarse classification of an [`ArchiveError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Format,
    Value,
    Transport,
    Unsupported,
    NotFound,
    Index,
}

impl ArchiveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Format { .. } | Self::Json(_) => ErrorKind::Format,
            Self::Value { .. } | Self::InvalidRequest { .. } => ErrorKind::Value,
            Self::Http(_) | Self::Status { .. } | Self::Io { .. } => ErrorKind::Transport,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Index { .. } => ErrorKind::Index,
        }
    }

    /// Returns true if the error is likely transient and the caller may retry
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => matches!(status, 502 | 503 | 504),
            _ => false,
        }
    }

    pub fn format<T: Into<String>>(offset: usize, message: T) -> Self {
        Self::Format {
            offset,
            message: message.into(),
        }
    }

    pub fn value<F: Into<String>, T: Into<String>>(field: F, message: T) -> Self {
        Self::Value {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Shifts the offset of a format error by `base`, so errors raised while
    /// decoding a single record point into the whole stream.
    pub fn at_offset(self, base: usize) -> Self {
        match self {
            Self::Format { offset, message } => Self::Format {
                offset: base + offset,
                message,
            },
            other => other,
        }
    }
}

/// Result type alias for ArchiveError
pub type Result<T> = std::result::Result<T, ArchiveError>;
