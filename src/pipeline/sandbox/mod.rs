pub mod fs;

pub use fs::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Invalid sandbox root {root}: {reason}")]
    Configuration { root: PathBuf, reason: String },

    #[error("Access outside sandbox is forbidden: {0}")]
    Violation(PathBuf),

    #[error("File not found or not a regular file: {0}")]
    NotFound(PathBuf),

    #[error("File too large ({size} bytes, limit {max_bytes}): {path}")]
    SizeLimitExceeded {
        path: PathBuf,
        size: u64,
        max_bytes: u64,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Failures that concern a single file and can be recorded as data.
    /// A bad root or a traversal attempt ends the run instead.
    pub fn is_per_file(&self) -> bool {
        !matches!(
            self,
            SandboxError::Configuration { .. } | SandboxError::Violation(_)
        )
    }
}
