// Header convention checks for source files.
// Substring membership over the first lines only; never fails.

use serde::{Deserialize, Serialize};

/// Markers every file header must carry, in report order.
pub const REQUIRED_MARKERS: &[&str] = &[
    "File name:",
    "Author:",
    "Date last modified:",
    "Python Version:",
    "Description:",
    "License:",
];

/// Marker whose value must not be blank.
pub const DESCRIPTION_MARKER: &str = "Description:";

/// Number of leading lines inspected by default.
pub const DEFAULT_TOP_LINES: usize = 40;

/// Which markers to require and where to look for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderRules {
    pub required_markers: Vec<String>,
    /// Marker that must be followed by text. `None` disables the check.
    pub description_marker: Option<String>,
    pub top_lines: usize,
}

impl Default for HeaderRules {
    fn default() -> Self {
        Self {
            required_markers: REQUIRED_MARKERS.iter().map(|m| m.to_string()).collect(),
            description_marker: Some(DESCRIPTION_MARKER.to_string()),
            top_lines: DEFAULT_TOP_LINES,
        }
    }
}

/// Outcome of one header validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderCheckResult {
    pub ok: bool,
    pub missing_keys: Vec<String>,
    pub message: String,
}

impl HeaderCheckResult {
    fn passed() -> Self {
        Self {
            ok: true,
            missing_keys: Vec::new(),
            message: "Header looks OK.".into(),
        }
    }
}

/// Check `source` against the default rules.
pub fn check_header(source: &str) -> HeaderCheckResult {
    check_header_with(source, &HeaderRules::default())
}

/// Check `source` against `rules`.
pub fn check_header_with(source: &str, rules: &HeaderRules) -> HeaderCheckResult {
    let head = source
        .lines()
        .take(rules.top_lines)
        .collect::<Vec<_>>()
        .join("\n");

    let missing: Vec<String> = rules
        .required_markers
        .iter()
        .filter(|marker| !head.contains(marker.as_str()))
        .cloned()
        .collect();

    if !missing.is_empty() {
        return HeaderCheckResult {
            ok: false,
            message: format!(
                "Missing header keys in first {} lines: {}",
                rules.top_lines,
                missing.join(", ")
            ),
            missing_keys: missing,
        };
    }

    if let Some(marker) = &rules.description_marker {
        if head.contains(marker.as_str()) && !has_field_value(&head, marker, &rules.required_markers)
        {
            return HeaderCheckResult {
                ok: false,
                missing_keys: Vec::new(),
                message: format!("{} field is present but empty.", marker.trim_end_matches(':')),
            };
        }
    }

    HeaderCheckResult::passed()
}

/// True when `marker` is followed by non-whitespace text before the next
/// required marker starts a line. The value may sit on the marker's own
/// line or on the indented lines below it.
fn has_field_value(head: &str, marker: &str, markers: &[String]) -> bool {
    let Some(pos) = head.find(marker) else {
        return false;
    };
    let rest = &head[pos + marker.len()..];

    for (i, line) in rest.lines().enumerate() {
        let trimmed = line.trim();
        if i > 0 && markers.iter().any(|m| trimmed.starts_with(m.as_str())) {
            break;
        }
        if !trimmed.is_empty() {
            return true;
        }
    }
    false
}
