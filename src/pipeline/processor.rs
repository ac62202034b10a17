//! Documentation pipeline orchestrator.
//!
//! Single entry point that drives one run over a source tree:
//! discover → check headers → scan secrets → generate docs → finalize.
//!
//! Dependencies (text generator, secret scanner) are passed in, so the
//! orchestrator is fully testable with mock implementations.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{DocFailurePolicy, GenerationSettings, PipelineConfig};
use crate::pipeline::docgen::{
    DocGenError, DocGenResult, DocRequest, DocumentGenerator, GenerationError,
    OpenAiCompatClient, TextGenerator,
};
use crate::pipeline::headers::check_header_with;
use crate::pipeline::sandbox::{SandboxError, SandboxFs};
use crate::pipeline::secrets::{RegexSecretScanner, SecretFinding, SecretScanner};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Documentation failed for {relpath}: {source}")]
    DocGeneration {
        relpath: PathBuf,
        #[source]
        source: DocGenError,
    },

    #[error("Text generation backend unavailable: {0}")]
    Backend(#[from] GenerationError),
}

// ---------------------------------------------------------------------------
// Stages and state
// ---------------------------------------------------------------------------

/// Pipeline stages, strictly linear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discover,
    CheckHeaders,
    ScanSecrets,
    GenerateDocs,
    Finalize,
    Done,
}

impl Stage {
    pub fn next(self) -> Stage {
        match self {
            Stage::Discover => Stage::CheckHeaders,
            Stage::CheckHeaders => Stage::ScanSecrets,
            Stage::ScanSecrets => Stage::GenerateDocs,
            Stage::GenerateDocs => Stage::Finalize,
            Stage::Finalize | Stage::Done => Stage::Done,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Discover => "discover",
            Stage::CheckHeaders => "check_headers",
            Stage::ScanSecrets => "scan_secrets",
            Stage::GenerateDocs => "generate_docs",
            Stage::Finalize => "finalize",
            Stage::Done => "done",
        }
    }
}

/// Everything one run accumulates. Keys are root-relative paths.
///
/// `header_issues`, `secrets` and `scan_errors` only hold files with
/// something to report; a file absent from `header_issues` passed.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    pub run_id: Uuid,
    pub request: String,
    pub root_dir: String,
    pub out_dir: String,
    pub file_list: Vec<PathBuf>,
    pub header_issues: BTreeMap<PathBuf, String>,
    pub secrets: BTreeMap<PathBuf, Vec<SecretFinding>>,
    /// Files the secret stage could not read.
    pub scan_errors: BTreeMap<PathBuf, String>,
    /// Relative path → written doc path.
    pub docs: BTreeMap<PathBuf, PathBuf>,
    /// Relative path → reason no doc was written.
    pub doc_failures: BTreeMap<PathBuf, String>,
    pub summary: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineState {
    pub fn new(request: &str, root_dir: &Path, out_dir: &Path) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            request: request.to_string(),
            root_dir: root_dir.display().to_string(),
            out_dir: out_dir.display().to_string(),
            file_list: Vec::new(),
            header_issues: BTreeMap::new(),
            secrets: BTreeMap::new(),
            scan_errors: BTreeMap::new(),
            docs: BTreeMap::new(),
            doc_failures: BTreeMap::new(),
            summary: String::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Human-readable run summary built from the accumulated counts.
    pub fn render_summary(&self) -> String {
        format!(
            "Processed {} files.\n\
             Header issues: {} files.\n\
             Secret findings: {} files.\n\
             Docs generated: {} files.\n\
             Doc failures: {} files.\n\
             Output dir: {}\n",
            self.file_list.len(),
            self.header_issues.len(),
            self.secrets.len(),
            self.docs.len(),
            self.doc_failures.len(),
            self.out_dir,
        )
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives a full run over a source tree.
///
/// Pure pipeline logic with trait-based DI. Reads go through a
/// `SandboxFs`; the only writes are the generated docs under `out_dir`.
pub struct DocPipeline {
    config: PipelineConfig,
    generator: DocumentGenerator,
    scanner: Arc<dyn SecretScanner>,
}

impl DocPipeline {
    pub fn new(
        config: PipelineConfig,
        llm: Arc<dyn TextGenerator>,
        scanner: Arc<dyn SecretScanner>,
    ) -> Self {
        let generator = DocumentGenerator::from_config(llm, &config);
        Self {
            config,
            generator,
            scanner,
        }
    }

    /// Replace the document generator (custom normalizer, backoff, ...).
    pub fn with_generator(mut self, generator: DocumentGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage over `root_dir`, writing docs into `out_dir`.
    ///
    /// A bad root fails before any stage starts. A traversal violation
    /// always ends the run; other per-file problems are recorded in the
    /// returned state (doc failures only under `DocFailurePolicy::Isolate`).
    pub async fn run(
        &self,
        root_dir: impl AsRef<Path>,
        out_dir: impl AsRef<Path>,
        request: &str,
    ) -> Result<PipelineState, PipelineError> {
        let state = PipelineState::new(request, root_dir.as_ref(), out_dir.as_ref());
        let span = tracing::info_span!("run", run_id = %state.run_id);

        self.run_stages(root_dir.as_ref(), out_dir.as_ref(), state)
            .instrument(span)
            .await
    }

    async fn run_stages(
        &self,
        root_dir: &Path,
        out_dir: &Path,
        mut state: PipelineState,
    ) -> Result<PipelineState, PipelineError> {
        let fs = SandboxFs::new(root_dir)?;
        let out_dir = std::path::absolute(out_dir).map_err(SandboxError::Io)?;

        tracing::info!(
            root = %fs.root().display(),
            out_dir = %out_dir.display(),
            "Starting documentation run"
        );

        let mut stage = Stage::Discover;
        while stage != Stage::Done {
            tracing::debug!(stage = stage.as_str(), "Entering stage");
            state = match stage {
                Stage::Discover => self.discover(&fs, state)?,
                Stage::CheckHeaders => self.check_headers(&fs, state)?,
                Stage::ScanSecrets => self.scan_secrets(&fs, state)?,
                Stage::GenerateDocs => self.generate_docs(&fs, &out_dir, state).await?,
                Stage::Finalize => self.finalize(state),
                Stage::Done => state,
            };
            stage = stage.next();
        }

        state.finished_at = Some(Utc::now());
        Ok(state)
    }

    /// Step 1: the single source of file identities for every later stage.
    fn discover(
        &self,
        fs: &SandboxFs,
        mut state: PipelineState,
    ) -> Result<PipelineState, PipelineError> {
        state.file_list = fs.list_relative_source_files(&self.config.source_extension)?;
        tracing::info!(files = state.file_list.len(), "Discovered source files");
        Ok(state)
    }

    /// Step 2: header conventions. Unreadable files are reported as issues.
    fn check_headers(
        &self,
        fs: &SandboxFs,
        mut state: PipelineState,
    ) -> Result<PipelineState, PipelineError> {
        let mut issues = BTreeMap::new();

        for rel in &state.file_list {
            tracing::debug!(relpath = %rel.display(), "Checking header");
            match self.read_source(fs, rel)? {
                Ok(source) => {
                    let result = check_header_with(&source, &self.config.header_rules);
                    if !result.ok {
                        issues.insert(rel.clone(), result.message);
                    }
                }
                Err(e) => {
                    issues.insert(rel.clone(), format!("Could not read file: {e}"));
                }
            }
        }

        tracing::info!(files_with_issues = issues.len(), "Header check complete");
        state.header_issues = issues;
        Ok(state)
    }

    /// Step 3: secret scan. Only counts are logged, never excerpts.
    fn scan_secrets(
        &self,
        fs: &SandboxFs,
        mut state: PipelineState,
    ) -> Result<PipelineState, PipelineError> {
        let mut all_findings = BTreeMap::new();
        let mut scan_errors = BTreeMap::new();

        for rel in &state.file_list {
            tracing::debug!(relpath = %rel.display(), "Scanning for secrets");
            match self.read_source(fs, rel)? {
                Ok(source) => {
                    let findings = self.scanner.scan(&source);
                    if !findings.is_empty() {
                        tracing::warn!(
                            relpath = %rel.display(),
                            count = findings.len(),
                            "Possible secrets found"
                        );
                        all_findings.insert(rel.clone(), findings);
                    }
                }
                Err(e) => {
                    scan_errors.insert(rel.clone(), e.to_string());
                }
            }
        }

        tracing::info!(
            files_with_findings = all_findings.len(),
            unreadable = scan_errors.len(),
            "Secret scan complete"
        );
        state.secrets = all_findings;
        state.scan_errors = scan_errors;
        Ok(state)
    }

    /// Step 4: one doc per file, `doc_concurrency` requests in flight.
    /// Results are merged into the state only after every file is done.
    async fn generate_docs(
        &self,
        fs: &SandboxFs,
        out_dir: &Path,
        mut state: PipelineState,
    ) -> Result<PipelineState, PipelineError> {
        let request = state.request.clone();
        let mut outcomes = Vec::with_capacity(state.file_list.len());

        {
            let mut pending = stream::iter(state.file_list.iter().cloned())
                .map(|rel| {
                    let request = request.as_str();
                    async move {
                        let outcome = self.document_file(fs, &rel, out_dir, request).await;
                        (rel, outcome)
                    }
                })
                .buffer_unordered(self.config.doc_concurrency.max(1));

            while let Some((rel, outcome)) = pending.next().await {
                match outcome {
                    Err(e) if !self.isolates(&e) => return Err(e),
                    outcome => outcomes.push((rel, outcome)),
                }
            }
        }

        let mut docs = BTreeMap::new();
        let mut failures = BTreeMap::new();
        for (rel, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    docs.insert(rel, result.out_path);
                }
                Err(e) => {
                    tracing::warn!(relpath = %rel.display(), error = %e, "Documentation failed");
                    failures.insert(rel, failure_reason(&e));
                }
            }
        }

        tracing::info!(
            generated = docs.len(),
            failed = failures.len(),
            "Documentation stage complete"
        );
        state.docs = docs;
        state.doc_failures = failures;
        Ok(state)
    }

    /// Step 5: summary only, no side effects.
    fn finalize(&self, mut state: PipelineState) -> PipelineState {
        state.summary = state.render_summary();
        tracing::info!(
            files = state.file_list.len(),
            header_issues = state.header_issues.len(),
            secret_files = state.secrets.len(),
            docs = state.docs.len(),
            doc_failures = state.doc_failures.len(),
            "Run finished"
        );
        state
    }

    /// Read one file. The outer `Result` carries run-ending sandbox errors,
    /// the inner one per-file failures.
    fn read_source(
        &self,
        fs: &SandboxFs,
        rel: &Path,
    ) -> Result<Result<String, SandboxError>, PipelineError> {
        match fs.read_text(rel, self.config.max_read_bytes) {
            Ok(source) => Ok(Ok(source)),
            Err(e) if e.is_per_file() => {
                tracing::warn!(relpath = %rel.display(), error = %e, "Skipping unreadable file");
                Ok(Err(e))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn document_file(
        &self,
        fs: &SandboxFs,
        rel: &Path,
        out_dir: &Path,
        request: &str,
    ) -> Result<DocGenResult, PipelineError> {
        let source = fs.read_text(rel, self.config.max_read_bytes)?;
        self.generator
            .generate(DocRequest {
                relpath: rel,
                source: &source,
                out_dir,
                request,
            })
            .await
            .map_err(|source| PipelineError::DocGeneration {
                relpath: rel.to_path_buf(),
                source,
            })
    }

    /// Whether a doc-stage failure is recorded instead of ending the run.
    fn isolates(&self, error: &PipelineError) -> bool {
        if self.config.doc_failure_policy == DocFailurePolicy::Abort {
            return false;
        }
        match error {
            PipelineError::Sandbox(e) => e.is_per_file(),
            PipelineError::DocGeneration { .. } => true,
            // Raised only by `build_pipeline`, never by a single file.
            PipelineError::Backend(_) => false,
        }
    }
}

fn failure_reason(error: &PipelineError) -> String {
    match error {
        PipelineError::DocGeneration { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Build a `DocPipeline` with production implementations:
/// an OpenAI-compatible HTTP backend and the regex secret scanner.
pub fn build_pipeline(
    config: PipelineConfig,
    settings: GenerationSettings,
) -> Result<DocPipeline, PipelineError> {
    let client = OpenAiCompatClient::new(settings)?;
    tracing::info!(model = client.model_id(), "Using HTTP text-generation backend");
    Ok(DocPipeline::new(
        config,
        Arc::new(client),
        Arc::new(RegexSecretScanner),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
