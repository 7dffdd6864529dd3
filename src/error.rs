//! Error taxonomy for the indexing and retrieval pipeline.
//!
//! Library operations return [`Result`] with a typed [`Error`] so callers can
//! tell transient provider failures apart from fatal ones. The CLI wraps
//! these in `anyhow` at the top level.

use std::path::PathBuf;

use serde::Serialize;

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A file with a supported extension could not be parsed.
    #[error("unreadable document {source_file}: {reason}")]
    UnreadableDocument { source_file: String, reason: String },

    /// Invalid chunking, retrieval, or provider settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The provider throttled the request (HTTP 429).
    #[error("rate limited by provider: {0}")]
    RateLimit(String),

    /// Network failure, timeout, or a 5xx from the provider.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Missing or rejected API credential.
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("dimension mismatch: index has {expected} dims, vector has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Persisted index is unreadable or disagrees with the current configuration.
    #[error("corrupt index at {path}: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    /// `answer` was called before the orchestrator reached `Ready`.
    #[error("orchestrator is not ready (state: {0})")]
    NotReady(String),

    /// The answer synthesizer returned an unusable response.
    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Coarse classification of an [`Error`], used in orchestrator state and
/// user-facing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnreadableDocument,
    Configuration,
    RateLimit,
    ServiceUnavailable,
    Authentication,
    DimensionMismatch,
    CorruptIndex,
    NotReady,
    Synthesis,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnreadableDocument { .. } => ErrorKind::UnreadableDocument,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::RateLimit(_) => ErrorKind::RateLimit,
            Error::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            Error::Authentication(_) => ErrorKind::Authentication,
            Error::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Error::CorruptIndex { .. } => ErrorKind::CorruptIndex,
            Error::NotReady(_) => ErrorKind::NotReady,
            Error::Synthesis(_) => ErrorKind::Synthesis,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// True for failures worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::RateLimit(_) | Error::ServiceUnavailable(_))
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptIndex {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::UnreadableDocument => "unreadable_document",
            ErrorKind::Configuration => "configuration",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::ServiceUnavailable => "service_unavailable",
            ErrorKind::Authentication => "authentication",
            ErrorKind::DimensionMismatch => "dimension_mismatch",
            ErrorKind::CorruptIndex => "corrupt_index",
            ErrorKind::NotReady => "not_ready",
            ErrorKind::Synthesis => "synthesis",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}
