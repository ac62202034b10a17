//! Read-only source tree auditor.
//!
//! Walks a source tree through a sandbox, checks per-file header
//! conventions, scans for leaked secrets and writes one Markdown document
//! per file using a text-generation backend. See [`pipeline::processor`].

pub mod config;
pub mod pipeline;

pub use config::{DocFailurePolicy, GenerationSettings, PipelineConfig};
pub use pipeline::processor::{build_pipeline, DocPipeline, PipelineError, PipelineState, Stage};

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// Honors `RUST_LOG`, falling back to [`config::default_log_filter`].
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
