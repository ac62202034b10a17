//! Response normalization.
//!
//! Backends disagree on response shape: bare strings, SDK message objects
//! whose `content` is a string or a list of typed blocks, and raw JSON
//! bodies of every flavor. `ResponseNormalizer` runs a fixed list of
//! extractors in priority order and takes the first hit. It never fails:
//! when nothing matches, the whole response is stringified.

use serde_json::{Map, Value};

/// Raw output of one text-generation call.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmResponse {
    /// Bare text.
    Text(String),
    /// SDK-style message object with a `content` attribute.
    Message(ResponseMessage),
    /// Loosely-typed JSON body, as returned by an HTTP API.
    Json(Value),
}

/// Attribute view of an SDK message object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResponseMessage {
    /// A string, or a list of `{"type": ..., "text": ...}` blocks.
    pub content: Value,
    pub model: Option<String>,
    pub model_name: Option<String>,
}

impl From<String> for LlmResponse {
    fn from(text: String) -> Self {
        LlmResponse::Text(text)
    }
}

impl From<&str> for LlmResponse {
    fn from(text: &str) -> Self {
        LlmResponse::Text(text.to_string())
    }
}

impl From<Value> for LlmResponse {
    fn from(value: Value) -> Self {
        LlmResponse::Json(value)
    }
}

/// Plain text plus an optional model identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedResponse {
    pub text: String,
    pub model_hint: Option<String>,
}

/// Mapping keys checked for a direct string body, in order.
const TEXT_KEYS: &[&str] = &["content", "text", "output", "message"];

/// Mapping keys checked for a model identifier, in order.
const MODEL_KEYS: &[&str] = &["model", "model_name"];

/// Nesting limit for the unstructured scan.
const MAX_DIG_DEPTH: usize = 6;

/// Block tags treated as text unless extended.
const DEFAULT_TEXT_TAGS: &[&str] = &["text", "output_text"];

type Extractor = fn(&ResponseNormalizer, &LlmResponse) -> Option<String>;

/// Priority order; the first extractor returning `Some` wins.
const EXTRACTORS: &[(&str, Extractor)] = &[
    ("plain_text", extract_plain_text),
    ("content_blocks", extract_content_blocks),
    ("content_string", extract_content_string),
    ("mapping", extract_from_mapping),
];

#[derive(Debug, Clone)]
pub struct ResponseNormalizer {
    text_tags: Vec<String>,
}

impl Default for ResponseNormalizer {
    fn default() -> Self {
        Self {
            text_tags: DEFAULT_TEXT_TAGS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl ResponseNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat content blocks tagged `tag` as text too.
    pub fn with_text_tag(mut self, tag: &str) -> Self {
        if !self.is_text_tag(tag) {
            self.text_tags.push(tag.to_string());
        }
        self
    }

    pub fn normalize(&self, response: &LlmResponse) -> NormalizedResponse {
        NormalizedResponse {
            text: self.extract_text(response),
            model_hint: extract_model_hint(response),
        }
    }

    pub fn extract_text(&self, response: &LlmResponse) -> String {
        for (name, extractor) in EXTRACTORS {
            if let Some(text) = extractor(self, response) {
                tracing::trace!(extractor = *name, "Response text extracted");
                return text;
            }
        }
        tracing::debug!("No extractor matched response; falling back to string form");
        fallback_string(response)
    }

    fn is_text_tag(&self, tag: &str) -> bool {
        self.text_tags.iter().any(|t| t == tag)
    }
}

/// Best-effort model identifier: first non-blank candidate, trimmed.
pub fn extract_model_hint(response: &LlmResponse) -> Option<String> {
    let candidates: Vec<Option<&str>> = match response {
        LlmResponse::Message(m) => vec![m.model.as_deref(), m.model_name.as_deref()],
        LlmResponse::Json(Value::Object(map)) => MODEL_KEYS
            .iter()
            .map(|k| map.get(*k).and_then(Value::as_str))
            .collect(),
        _ => Vec::new(),
    };

    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Extractors
// ---------------------------------------------------------------------------

fn extract_plain_text(_: &ResponseNormalizer, response: &LlmResponse) -> Option<String> {
    match response {
        LlmResponse::Text(text) | LlmResponse::Json(Value::String(text)) => Some(text.clone()),
        _ => None,
    }
}

fn extract_content_blocks(normalizer: &ResponseNormalizer, response: &LlmResponse) -> Option<String> {
    let Value::Array(blocks) = content_of(response)? else {
        return None;
    };

    let parts: Vec<&str> = blocks
        .iter()
        .filter_map(Value::as_object)
        .filter(|block| {
            block
                .get("type")
                .and_then(Value::as_str)
                .is_some_and(|tag| normalizer.is_text_tag(tag))
        })
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

fn extract_content_string(_: &ResponseNormalizer, response: &LlmResponse) -> Option<String> {
    content_of(response)?.as_str().map(str::to_string)
}

fn extract_from_mapping(_: &ResponseNormalizer, response: &LlmResponse) -> Option<String> {
    let LlmResponse::Json(Value::Object(map)) = response else {
        return None;
    };

    TEXT_KEYS
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .map(str::to_string)
        .or_else(|| dig_mapping(map, 0))
}

/// The `content` attribute of a message, or the `content` key of a JSON object.
fn content_of(response: &LlmResponse) -> Option<&Value> {
    match response {
        LlmResponse::Message(m) => Some(&m.content),
        LlmResponse::Json(Value::Object(map)) => map.get("content"),
        _ => None,
    }
}

/// Search nested JSON for a plausible message body, preferring
/// `message.content`, then `choices`, then any non-empty string.
fn dig_for_string(value: &Value, depth: usize) -> Option<String> {
    if depth > MAX_DIG_DEPTH {
        return None;
    }
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => dig_mapping(map, depth),
        Value::Array(items) => items.iter().find_map(|v| dig_for_string(v, depth + 1)),
        _ => None,
    }
}

fn dig_mapping(map: &Map<String, Value>, depth: usize) -> Option<String> {
    if depth > MAX_DIG_DEPTH {
        return None;
    }

    let message_content = map
        .get("message")
        .and_then(Value::as_object)
        .and_then(|msg| msg.get("content"))
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty());
    if let Some(content) = message_content {
        return Some(content.to_string());
    }

    if let Some(Value::Array(choices)) = map.get("choices") {
        if let Some(found) = choices.iter().find_map(|c| dig_for_string(c, depth + 1)) {
            return Some(found);
        }
    }

    map.values().find_map(|v| dig_for_string(v, depth + 1))
}

fn fallback_string(response: &LlmResponse) -> String {
    match response {
        LlmResponse::Text(text) => text.clone(),
        LlmResponse::Message(m) => m.content.to_string(),
        LlmResponse::Json(value) => value.to_string(),
    }
}
