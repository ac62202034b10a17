use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;

use super::response::LlmResponse;
use super::GenerationError;

/// Text-generation backend abstraction (allows mocking).
///
/// The response shape is left opaque; `ResponseNormalizer` turns it into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn invoke(&self, prompt: &str) -> Result<LlmResponse, GenerationError>;
}

/// One documentation request.
#[derive(Debug, Clone, Copy)]
pub struct DocRequest<'a> {
    /// Identity of the file, relative to the sandbox root.
    pub relpath: &'a Path,
    pub source: &'a str,
    pub out_dir: &'a Path,
    /// Free-text emphasis ("focus on the public API", ...).
    pub request: &'a str,
}

/// Result of one successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocGenResult {
    pub out_path: PathBuf,
    pub bytes_written: usize,
    pub model_hint: Option<String>,
}
