//! Error types for the retrieval engine and evaluation harness.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, RankfuseError>;

/// Errors that can occur in the retrieval engine and harness.
///
/// Configuration errors are fatal and abort a run before any query executes.
/// HTTP, judge, and parse errors are per-query transients: the harness records
/// them on the affected query and keeps going.
#[derive(Error, Debug)]
pub enum RankfuseError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The benchmark file does not exist.
    #[error("Benchmark not found at '{0}'")]
    BenchmarkNotFound(PathBuf),

    /// The corpus file does not exist or contains no passages.
    #[error("Corpus at '{0}' does not exist or is empty")]
    InvalidCorpus(PathBuf),

    /// Invalid or missing configuration. Fatal: surfaced before any query runs.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The judge service returned an application-level error.
    #[error("Judge error: {0}")]
    Judge(String),

    /// The judge call exceeded its deadline.
    #[error("Judge call timed out after {0}s")]
    JudgeTimeout(u64),

    /// LLM API error (answer generation).
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// Embedding service error.
    #[error("Embedding API error: {0}")]
    EmbeddingApi(String),

    /// A service response could not be parsed.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),
}

impl RankfuseError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether a retry at the collaborator boundary could plausibly succeed.
    ///
    /// Timeouts and transport failures are retryable; configuration and parse
    /// failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RankfuseError::Http(_) | RankfuseError::JudgeTimeout(_)
        )
    }
}

impl From<reqwest::Error> for RankfuseError {
    fn from(err: reqwest::Error) -> Self {
        RankfuseError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for RankfuseError {
    fn from(err: serde_json::Error) -> Self {
        RankfuseError::Parse(err.to_string())
    }
}
