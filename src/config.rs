//! Run configuration.
//!
//! Defaults mirror what a typical Python tree needs. `from_env` applies
//! `SOURCEDOC_*` overrides for the extension, read and prompt limits,
//! doc concurrency, fail-fast, and the backend URL, model, key and token
//! budget. Other fields are set through serde or struct literals.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::pipeline::docgen::prompt::DOC_PROMPT;
use crate::pipeline::headers::HeaderRules;

/// Application-level constants
pub const APP_NAME: &str = "sourcedoc";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Largest file the sandbox will read into memory (bytes).
pub const DEFAULT_MAX_READ_BYTES: u64 = 2_000_000;

/// Character ceiling for the source section of a documentation prompt.
pub const DEFAULT_MAX_SOURCE_CHARS: usize = 120_000;

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "warn,sourcedoc=info"
}

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// What the doc stage does when a single file fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocFailurePolicy {
    /// Record the failure for that file and keep going.
    #[default]
    Isolate,
    /// Stop the whole run on the first failed file.
    Abort,
}

/// Pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Extension (without the dot) of the files to process.
    pub source_extension: String,
    /// Per-file read guard.
    pub max_read_bytes: u64,
    /// Header markers and scan window.
    pub header_rules: HeaderRules,
    /// Source text beyond this many characters is truncated head + tail.
    pub max_source_chars: usize,
    /// Number of documentation requests in flight at once.
    pub doc_concurrency: usize,
    pub doc_failure_policy: DocFailurePolicy,
    /// Extra attempts for retryable backend failures.
    pub generation_retries: usize,
    /// Template with `{relpath}`, `{source}` and `{request}` placeholders.
    pub prompt_template: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_extension: "py".into(),
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
            header_rules: HeaderRules::default(),
            max_source_chars: DEFAULT_MAX_SOURCE_CHARS,
            doc_concurrency: 4,
            doc_failure_policy: DocFailurePolicy::Isolate,
            generation_retries: 2,
            prompt_template: DOC_PROMPT.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Defaults with `SOURCEDOC_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(ext) = env_string("SOURCEDOC_EXTENSION") {
            config.source_extension = ext.trim_start_matches('.').to_string();
        }
        if let Some(v) = env_parse("SOURCEDOC_MAX_READ_BYTES") {
            config.max_read_bytes = v;
        }
        if let Some(v) = env_parse("SOURCEDOC_MAX_SOURCE_CHARS") {
            config.max_source_chars = v;
        }
        if let Some(v) = env_parse::<usize>("SOURCEDOC_DOC_CONCURRENCY") {
            config.doc_concurrency = v.max(1);
        }
        if let Some(true) = env_parse::<bool>("SOURCEDOC_FAIL_FAST") {
            config.doc_failure_policy = DocFailurePolicy::Abort;
        }
        config
    }
}

/// Settings for the HTTP text-generation backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,
    pub model_id: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".into(),
            model_id: "openai.gpt-oss-120b".into(),
            api_key: None,
            temperature: 0.0,
            top_p: 1.0,
            max_tokens: 4000,
            timeout_secs: 300,
        }
    }
}

impl GenerationSettings {
    /// Defaults with `SOURCEDOC_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Some(url) = env_string("SOURCEDOC_BASE_URL") {
            settings.base_url = url;
        }
        if let Some(model) = env_string("SOURCEDOC_MODEL") {
            settings.model_id = model;
        }
        settings.api_key = env_string("SOURCEDOC_API_KEY");
        if let Some(v) = env_parse("SOURCEDOC_MAX_TOKENS") {
            settings.max_tokens = v;
        }
        settings
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_string(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparsable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let config = PipelineConfig::default();
        assert_eq!(config.source_extension, "py");
        assert_eq!(config.max_read_bytes, 2_000_000);
        assert_eq!(config.max_source_chars, 120_000);
        assert_eq!(config.header_rules.top_lines, 40);
        assert_eq!(config.doc_failure_policy, DocFailurePolicy::Isolate);
        assert!(config.prompt_template.contains("{source}"));
    }

    #[test]
    fn config_deserializes_with_partial_fields() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"source_extension": "rs", "doc_failure_policy": "abort"}"#)
                .unwrap();
        assert_eq!(config.source_extension, "rs");
        assert_eq!(config.doc_failure_policy, DocFailurePolicy::Abort);
        assert_eq!(config.max_source_chars, DEFAULT_MAX_SOURCE_CHARS);
    }

    #[test]
    fn api_key_is_never_serialized() {
        let settings = GenerationSettings {
            api_key: Some("sk-test".into()),
            ..GenerationSettings::default()
        };
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("sk-test"));
    }

    #[test]
    fn default_log_filter_targets_crate() {
        assert!(default_log_filter().contains("sourcedoc=info"));
    }

    #[test]
    fn app_name_is_sourcedoc() {
        assert_eq!(APP_NAME, "sourcedoc");
    }

    // -- Environment overrides (process-global, so serialized) -------------

    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "SOURCEDOC_EXTENSION",
        "SOURCEDOC_MAX_READ_BYTES",
        "SOURCEDOC_MAX_SOURCE_CHARS",
        "SOURCEDOC_DOC_CONCURRENCY",
        "SOURCEDOC_FAIL_FAST",
        "SOURCEDOC_BASE_URL",
        "SOURCEDOC_MODEL",
        "SOURCEDOC_API_KEY",
        "SOURCEDOC_MAX_TOKENS",
    ];

    /// Run `f` with exactly `vars` set among the `SOURCEDOC_*` keys.
    fn with_env<T>(vars: &[(&str, &str)], f: impl FnOnce() -> T) -> T {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
        for (key, value) in vars {
            std::env::set_var(key, value);
        }
        let out = f();
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
        out
    }

    #[test]
    fn no_overrides_gives_defaults() {
        let (config, settings) =
            with_env(&[], || (PipelineConfig::from_env(), GenerationSettings::from_env()));
        assert_eq!(config.source_extension, "py");
        assert_eq!(config.doc_concurrency, 4);
        assert_eq!(config.doc_failure_policy, DocFailurePolicy::Isolate);
        assert_eq!(settings.model_id, "openai.gpt-oss-120b");
        assert_eq!(settings.api_key, None);
    }

    #[test]
    fn pipeline_overrides_apply() {
        let config = with_env(
            &[
                ("SOURCEDOC_EXTENSION", ".rs"),
                ("SOURCEDOC_MAX_READ_BYTES", "1000"),
                ("SOURCEDOC_MAX_SOURCE_CHARS", "500"),
                ("SOURCEDOC_DOC_CONCURRENCY", "0"),
                ("SOURCEDOC_FAIL_FAST", "true"),
            ],
            PipelineConfig::from_env,
        );
        assert_eq!(config.source_extension, "rs");
        assert_eq!(config.max_read_bytes, 1000);
        assert_eq!(config.max_source_chars, 500);
        assert_eq!(config.doc_concurrency, 1);
        assert_eq!(config.doc_failure_policy, DocFailurePolicy::Abort);
    }

    #[test]
    fn fail_fast_false_keeps_isolation() {
        let config = with_env(&[("SOURCEDOC_FAIL_FAST", "false")], PipelineConfig::from_env);
        assert_eq!(config.doc_failure_policy, DocFailurePolicy::Isolate);
    }

    #[test]
    fn unparsable_overrides_keep_defaults() {
        let config = with_env(
            &[
                ("SOURCEDOC_MAX_READ_BYTES", "lots"),
                ("SOURCEDOC_DOC_CONCURRENCY", "-3"),
                ("SOURCEDOC_FAIL_FAST", "yes"),
            ],
            PipelineConfig::from_env,
        );
        assert_eq!(config.max_read_bytes, DEFAULT_MAX_READ_BYTES);
        assert_eq!(config.doc_concurrency, 4);
        assert_eq!(config.doc_failure_policy, DocFailurePolicy::Isolate);

        let settings = with_env(
            &[("SOURCEDOC_MAX_TOKENS", "many")],
            GenerationSettings::from_env,
        );
        assert_eq!(settings.max_tokens, 4000);
    }

    #[test]
    fn generation_overrides_apply() {
        let settings = with_env(
            &[
                ("SOURCEDOC_BASE_URL", "http://llm.internal:8000/v1"),
                ("SOURCEDOC_MODEL", " local-model "),
                ("SOURCEDOC_API_KEY", "sk-local"),
                ("SOURCEDOC_MAX_TOKENS", "2048"),
            ],
            GenerationSettings::from_env,
        );
        assert_eq!(settings.base_url, "http://llm.internal:8000/v1");
        assert_eq!(settings.model_id, "local-model");
        assert_eq!(settings.api_key.as_deref(), Some("sk-local"));
        assert_eq!(settings.max_tokens, 2048);
    }

    #[test]
    fn blank_api_key_is_treated_as_unset() {
        let settings = with_env(&[("SOURCEDOC_API_KEY", "   ")], GenerationSettings::from_env);
        assert_eq!(settings.api_key, None);
    }
}
