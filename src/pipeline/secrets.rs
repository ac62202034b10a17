//! Leaked-secret scanning.
//!
//! The pipeline only needs `scan(source) -> findings`; the regex ruleset
//! below is the default implementation and can be swapped for any
//! `SecretScanner` (including a plain closure).

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One suspected secret in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretFinding {
    pub kind: String,
    /// 1-based line number.
    pub line: usize,
    /// Masked excerpt of the matched text.
    pub excerpt: String,
}

/// Scans source text for secrets. Called once per file, no shared state.
pub trait SecretScanner: Send + Sync {
    fn scan(&self, source: &str) -> Vec<SecretFinding>;
}

impl<F> SecretScanner for F
where
    F: Fn(&str) -> Vec<SecretFinding> + Send + Sync,
{
    fn scan(&self, source: &str) -> Vec<SecretFinding> {
        self(source)
    }
}

/// A compiled pattern with the kind it reports.
struct SecretPattern {
    regex: Regex,
    kind: &'static str,
}

fn pattern(regex_str: &str, kind: &'static str) -> SecretPattern {
    SecretPattern {
        regex: Regex::new(regex_str).expect("Invalid secret regex pattern"),
        kind,
    }
}

static SECRET_PATTERNS: LazyLock<Vec<SecretPattern>> = LazyLock::new(|| {
    vec![
        pattern(
            r"-----BEGIN (?:RSA |EC |DSA |OPENSSH |PGP )?PRIVATE KEY(?: BLOCK)?-----",
            "private_key",
        ),
        pattern(r"\b(?:AKIA|ASIA)[0-9A-Z]{16}\b", "aws_access_key_id"),
        pattern(r"\bgh[pousr]_[A-Za-z0-9]{36,}\b", "github_token"),
        pattern(r"\bxox[abprs]-[A-Za-z0-9-]{10,}\b", "slack_token"),
        pattern(r"\bsk-[A-Za-z0-9_-]{20,}\b", "api_secret_key"),
        pattern(
            r"\beyJ[A-Za-z0-9_-]{10,}\.eyJ[A-Za-z0-9_-]{10,}\.[A-Za-z0-9_-]{10,}\b",
            "jwt",
        ),
        pattern(
            r#"(?i)\b[a-z0-9_]*(?:api[_-]?key|secret|token|passw(?:or)?d|pwd)[a-z0-9_]*\s*[:=]\s*["'][^"'\s]{8,}["']"#,
            "hardcoded_credential",
        ),
    ]
});

/// Default scanner backed by the built-in regex ruleset.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexSecretScanner;

impl SecretScanner for RegexSecretScanner {
    fn scan(&self, source: &str) -> Vec<SecretFinding> {
        let mut findings = Vec::new();
        for (idx, line) in source.lines().enumerate() {
            for p in SECRET_PATTERNS.iter() {
                if let Some(m) = p.regex.find(line) {
                    findings.push(SecretFinding {
                        kind: p.kind.to_string(),
                        line: idx + 1,
                        excerpt: mask(m.as_str()),
                    });
                }
            }
        }
        findings
    }
}

/// Keep the first few characters so the finding is recognizable without
/// reproducing the secret.
fn mask(matched: &str) -> String {
    let visible: String = matched.chars().take(4).collect();
    format!("{visible}****")
}
