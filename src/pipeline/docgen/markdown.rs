// Post-processing of generated Markdown and output naming.
// Minimal cleanup only: unwrap a whole-document fence, ensure a title.

use std::path::{Component, Path};

/// Joins path components in output file names: `a/b/c.py` -> `a__b__c.py.md`.
pub const PATH_JOINER: &str = "__";

/// Suffix appended to every output file name.
pub const DOC_SUFFIX: &str = ".md";

const FENCE: &str = "```";

/// Unwrap a single enclosing fence, then make sure the document starts
/// with a top-level heading (synthesized from `relpath` when absent).
pub fn postprocess_markdown(text: &str, relpath: &Path) -> String {
    let unwrapped = unwrap_single_fence(text.trim());

    if has_title(&unwrapped) {
        unwrapped
    } else {
        format!("# {}\n\n{}", relpath.display(), unwrapped)
    }
}

/// If the whole text is one ```...``` block, return its interior.
/// Text holding several fenced blocks is returned unchanged.
pub fn unwrap_single_fence(text: &str) -> String {
    if text.starts_with(FENCE) && text.ends_with(FENCE) {
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() >= 3 && lines[0].starts_with(FENCE) && lines[lines.len() - 1].starts_with(FENCE)
        {
            let interior = &lines[1..lines.len() - 1];
            if !interior.iter().any(|line| line.trim_start().starts_with(FENCE)) {
                return interior.join("\n").trim().to_string();
            }
        }
    }
    text.to_string()
}

/// `# ` heading (optionally indented) at the very start.
fn has_title(text: &str) -> bool {
    let mut chars = text.trim_start().chars();
    chars.next() == Some('#') && chars.next().is_some_and(char::is_whitespace)
}

/// Flat, collision-free output name for a relative source path.
pub fn safe_doc_filename(relpath: &Path) -> String {
    let parts: Vec<String> = relpath
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("{}{}", parts.join(PATH_JOINER), DOC_SUFFIX)
}
