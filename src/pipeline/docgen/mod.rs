pub mod types;
pub mod response;
pub mod prompt;
pub mod markdown;
pub mod client;
pub mod generator;

pub use types::*;
pub use response::*;
pub use prompt::*;
pub use markdown::*;
pub use client::*;
pub use generator::*;

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the text-generation backend itself.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Backend is not reachable at {0}")]
    Connection(String),

    #[error("Backend returned error (status {status}): {body}")]
    Http { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Text generation unavailable: {0}")]
    Unavailable(String),
}

impl GenerationError {
    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            GenerationError::Connection(_) | GenerationError::HttpClient(_) => true,
            GenerationError::Http { status, .. } => *status == 429 || *status >= 500,
            GenerationError::ResponseParsing(_) | GenerationError::Unavailable(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum DocGenError {
    #[error("Empty source for {0}")]
    EmptyInput(PathBuf),

    #[error("LLM returned empty documentation content for {0}")]
    EmptyGeneration(PathBuf),

    #[error("LLM invocation failed: {0}")]
    GenerationFailed(#[source] GenerationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
