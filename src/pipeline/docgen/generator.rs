use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use super::markdown::{postprocess_markdown, safe_doc_filename, unwrap_single_fence};
use super::prompt::{render_prompt, truncate_source, DOC_PROMPT};
use super::response::{LlmResponse, ResponseNormalizer};
use super::types::{DocGenResult, DocRequest, TextGenerator};
use super::DocGenError;
use crate::config::{PipelineConfig, DEFAULT_MAX_SOURCE_CHARS};

/// Maximum extra attempts for retryable backend failures.
const DEFAULT_MAX_RETRIES: usize = 2;

/// Base delay between attempts; multiplied by the attempt number.
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Produces one Markdown document per source file:
/// truncate → prompt → LLM → normalize → post-process → atomic write
pub struct DocumentGenerator {
    llm: Arc<dyn TextGenerator>,
    normalizer: ResponseNormalizer,
    prompt_template: String,
    max_source_chars: usize,
    max_retries: usize,
    retry_backoff: Duration,
}

impl DocumentGenerator {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self {
            llm,
            normalizer: ResponseNormalizer::default(),
            prompt_template: DOC_PROMPT.to_string(),
            max_source_chars: DEFAULT_MAX_SOURCE_CHARS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }

    pub fn from_config(llm: Arc<dyn TextGenerator>, config: &PipelineConfig) -> Self {
        Self::new(llm)
            .with_prompt_template(&config.prompt_template)
            .with_max_source_chars(config.max_source_chars)
            .with_retries(config.generation_retries)
    }

    pub fn with_prompt_template(mut self, template: &str) -> Self {
        self.prompt_template = template.to_string();
        self
    }

    pub fn with_max_source_chars(mut self, max_chars: usize) -> Self {
        self.max_source_chars = max_chars;
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_normalizer(mut self, normalizer: ResponseNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Prompt for `request`, with the source truncated to the character ceiling.
    pub fn build_prompt(&self, request: &DocRequest<'_>) -> String {
        let source = truncate_source(request.source, self.max_source_chars);
        render_prompt(
            &self.prompt_template,
            request.relpath,
            &source,
            request.request,
        )
    }

    /// Generate and write the documentation for one file.
    pub async fn generate(&self, request: DocRequest<'_>) -> Result<DocGenResult, DocGenError> {
        let span = tracing::info_span!("generate_doc", relpath = %request.relpath.display());
        self.generate_inner(request).instrument(span).await
    }

    async fn generate_inner(&self, request: DocRequest<'_>) -> Result<DocGenResult, DocGenError> {
        if request.source.trim().is_empty() {
            return Err(DocGenError::EmptyInput(request.relpath.to_path_buf()));
        }

        std::fs::create_dir_all(request.out_dir)?;

        let prompt = self.build_prompt(&request);
        let response = self.call_llm_with_retry(&prompt).await?;
        let normalized = self.normalizer.normalize(&response);

        // A synthesized title alone does not count as documentation.
        if unwrap_single_fence(normalized.text.trim()).trim().is_empty() {
            return Err(DocGenError::EmptyGeneration(request.relpath.to_path_buf()));
        }
        let markdown = postprocess_markdown(&normalized.text, request.relpath);

        let out_path = request.out_dir.join(safe_doc_filename(request.relpath));
        let data = format!("{}\n", markdown.trim_end()).into_bytes();
        write_atomic(request.out_dir, &out_path, &data)?;

        tracing::info!(
            out_path = %out_path.display(),
            bytes = data.len(),
            model = normalized.model_hint.as_deref().unwrap_or("unknown"),
            "Documentation written"
        );

        Ok(DocGenResult {
            out_path,
            bytes_written: data.len(),
            model_hint: normalized.model_hint,
        })
    }

    /// Invoke the backend, retrying transient failures a bounded number of times.
    async fn call_llm_with_retry(&self, prompt: &str) -> Result<LlmResponse, DocGenError> {
        let mut attempt = 0;
        loop {
            match self.llm.invoke(prompt).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(attempt, error = %e, "LLM call failed, retrying");
                    tokio::time::sleep(self.retry_backoff * attempt as u32).await;
                }
                Err(e) => return Err(DocGenError::GenerationFailed(e)),
            }
        }
    }
}

/// Write to a temp file beside `target`, then rename over it, so readers
/// never observe a half-written document.
fn write_atomic(dir: &Path, target: &Path, data: &[u8]) -> Result<(), DocGenError> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| DocGenError::Persist {
        path: target.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}
