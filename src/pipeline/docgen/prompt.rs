use std::path::Path;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Default documentation prompt.
/// Placeholders: `{relpath}`, `{source}`, `{request}`.
pub const DOC_PROMPT: &str = r#"
You are a senior software engineer.

You must generate documentation for the following source file.
The user request below specifies what to emphasize. Follow it carefully when relevant.

IMPORTANT SAFETY RULES:
- Never include secrets, credentials, API keys, tokens, private keys, or passwords.
- If the source contains sensitive-looking values, do not reproduce them. Describe them generically.

USER REQUEST (high priority):
{request}

Output format:
- Markdown
- Title: the file path
- Sections:
  - Overview (what it does, in 3-6 bullet points)
  - Public API (functions/types likely intended for import/use)
  - Key behaviors and edge cases
  - Inputs/outputs and side effects
  - Usage examples (short, realistic)
  - Risks/TODOs (brief)

Keep it practical and concise.

FILE PATH: {relpath}

SOURCE:
```
{source}
```
"#;

/// Share of the budget kept from the start of the file.
const HEAD_SHARE: f64 = 0.65;
/// Share of the budget kept from the end of the file.
const TAIL_SHARE: f64 = 0.25;

const TRUNCATION_NOTICE: &str = "\n\n# --- TRUNCATED ---\n\
# The source file was truncated before being sent to the LLM.\n\
# Consider generating docs per-section if you need full coverage.\n\
# --- TRUNCATED ---\n\n";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{(relpath|source|request)\}").expect("Invalid placeholder regex")
});

/// Substitute the placeholders in one pass, so substituted text that
/// happens to look like a placeholder is left alone.
pub fn render_prompt(template: &str, relpath: &Path, source: &str, request: &str) -> String {
    let relpath = relpath.display().to_string();
    let request = request.trim();

    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match &caps[1] {
            "relpath" => relpath.clone(),
            "source" => source.to_string(),
            _ => request.to_string(),
        })
        .into_owned()
}

/// Bound `source` to roughly `max_chars` characters, keeping the head and
/// the tail of the file around a visible truncation notice.
/// Returns the input unchanged when it already fits.
pub fn truncate_source(source: &str, max_chars: usize) -> String {
    let total = source.chars().count();
    if total <= max_chars {
        return source.to_string();
    }

    let head_chars = (max_chars as f64 * HEAD_SHARE) as usize;
    let tail_chars = (max_chars as f64 * TAIL_SHARE) as usize;

    let head: String = source.chars().take(head_chars).collect();
    let tail: String = source.chars().skip(total - tail_chars).collect();

    format!("{head}{TRUNCATION_NOTICE}{tail}")
}

/// True when `text` carries the truncation notice.
pub fn is_truncated(text: &str) -> bool {
    text.contains(TRUNCATION_NOTICE)
}
