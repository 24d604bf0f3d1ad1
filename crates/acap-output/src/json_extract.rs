//! Tolerant recovery of one JSON object from free-form agent output.
//!
//! Stages run in a fixed order and the first object satisfying the key
//! constraints wins:
//!
//! 1. the whole trimmed text parsed directly,
//! 2. fenced code blocks (```` ```json ````, ```` ```JSON ````, then bare fences),
//! 3. a streaming decode starting at every `{` in the text.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::debug;

const MAX_REPORTED_REASONS: usize = 8;
const PREVIEW_CHARS: usize = 300;
const FENCE_MARKERS: [&str; 3] = ["```json", "```JSON", "```"];

/// Key-shape constraints applied to every candidate object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    pub required_keys: BTreeSet<String>,
    /// Reject objects carrying keys outside `required_keys`.
    pub exact_keys: bool,
}

impl ExtractOptions {
    pub fn new<I, S>(required_keys: I, exact_keys: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_keys: required_keys.into_iter().map(Into::into).collect(),
            exact_keys,
        }
    }
}

/// Extraction stage, reported to an [`ExtractObserver`] before it runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractStage {
    Direct,
    Fenced,
    Scan,
}

/// Instrumentation hook for stage attempts.
pub trait ExtractObserver {
    fn stage_attempted(&mut self, stage: ExtractStage);
}

impl ExtractObserver for Vec<ExtractStage> {
    fn stage_attempted(&mut self, stage: ExtractStage) {
        self.push(stage);
    }
}

struct NoopObserver;

impl ExtractObserver for NoopObserver {
    fn stage_attempted(&mut self, _stage: ExtractStage) {}
}

/// Diagnostic produced when no stage yields a conforming object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "Could not extract valid JSON from agent output.\n\
     Required keys: {}\n\
     Exact keys required: {exact_keys}\n\
     Parsing stages attempted: {}\n\
     Output start:\n{output_start}\n\n\
     Output end:\n{output_end}",
    format_keys(.required_keys),
    .reasons.join(" | ")
)]
pub struct ExtractError {
    /// Per-stage failure reasons (first eight).
    pub reasons: Vec<String>,
    pub required_keys: Vec<String>,
    pub exact_keys: bool,
    pub output_start: String,
    pub output_end: String,
}

fn format_keys(keys: &[String]) -> String {
    if keys.is_empty() {
        "none".to_string()
    } else {
        format!("{keys:?}")
    }
}

/// Extract one JSON object from `text`.
pub fn extract_json_object(
    text: &str,
    options: &ExtractOptions,
) -> Result<Map<String, Value>, ExtractError> {
    extract_json_object_observed(text, options, &mut NoopObserver)
}

/// [`extract_json_object`] reporting each stage attempt to `observer`.
pub fn extract_json_object_observed(
    text: &str,
    options: &ExtractOptions,
    observer: &mut dyn ExtractObserver,
) -> Result<Map<String, Value>, ExtractError> {
    let cleaned = text.trim();
    let mut reasons = Vec::new();

    observer.stage_attempted(ExtractStage::Direct);
    match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => match validate(value, options) {
            Ok(object) => return Ok(object),
            Err(reason) => reasons.push(format!("Direct parse shape invalid: {reason}")),
        },
        Err(err) => reasons.push(format!("Direct parse failed: {err}")),
    }

    if cleaned.contains("```") {
        observer.stage_attempted(ExtractStage::Fenced);
        for (i, block) in fenced_blocks(cleaned).into_iter().enumerate() {
            let n = i + 1;
            match serde_json::from_str::<Value>(block) {
                Ok(value) => match validate(value, options) {
                    Ok(object) => {
                        debug!(block = n, "extracted JSON from fenced block");
                        return Ok(object);
                    }
                    Err(reason) => {
                        reasons.push(format!("Fenced block #{n} shape invalid: {reason}"))
                    }
                },
                Err(err) => reasons.push(format!("Fenced block #{n} parse failed: {err}")),
            }
        }
    }

    observer.stage_attempted(ExtractStage::Scan);
    for (idx, _) in cleaned.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&cleaned[idx..]).into_iter::<Value>();
        let Some(Ok(value)) = stream.next() else {
            continue;
        };
        match validate(value, options) {
            Ok(object) => {
                debug!(index = idx, "extracted JSON by scanning");
                return Ok(object);
            }
            Err(reason) => reasons.push(format!(
                "raw_decode object at index {idx} shape invalid: {reason}"
            )),
        }
    }

    reasons.truncate(MAX_REPORTED_REASONS);
    Err(ExtractError {
        reasons,
        required_keys: options.required_keys.iter().cloned().collect(),
        exact_keys: options.exact_keys,
        output_start: cleaned.chars().take(PREVIEW_CHARS).collect(),
        output_end: tail_chars(cleaned, PREVIEW_CHARS).to_string(),
    })
}

/// Contents of every fenced block, in marker order then position order.
///
/// One newline directly after the opening marker is skipped; empty blocks
/// are dropped.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    for marker in FENCE_MARKERS {
        let mut start = 0;
        while let Some(found) = text[start..].find(marker) {
            let mut content_start = start + found + marker.len();
            if text[content_start..].starts_with('\n') {
                content_start += 1;
            }
            let Some(close) = text[content_start..].find("```") else {
                break;
            };
            let close_idx = content_start + close;
            let block = text[content_start..close_idx].trim();
            if !block.is_empty() {
                blocks.push(block);
            }
            start = close_idx + 3;
        }
    }
    blocks
}

fn validate(value: Value, options: &ExtractOptions) -> Result<Map<String, Value>, String> {
    let object = match value {
        Value::Object(object) => object,
        other => {
            return Err(format!(
                "Parsed JSON was {}, expected object",
                json_type_name(&other)
            ));
        }
    };

    if options.required_keys.is_empty() {
        return Ok(object);
    }

    let missing: Vec<&String> = options
        .required_keys
        .iter()
        .filter(|key| !object.contains_key(key.as_str()))
        .collect();
    if !missing.is_empty() {
        return Err(format!("Missing required keys: {missing:?}"));
    }

    if options.exact_keys {
        let mut extra: Vec<&String> = object
            .keys()
            .filter(|key| !options.required_keys.contains(key.as_str()))
            .collect();
        if !extra.is_empty() {
            extra.sort();
            return Err(format!("Unexpected keys present: {extra:?}"));
        }
    }

    Ok(object)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn tail_chars(text: &str, count: usize) -> &str {
    let skip = text.chars().count().saturating_sub(count);
    text.char_indices()
        .nth(skip)
        .map_or("", |(idx, _)| &text[idx..])
}

#[cfg(test)]
#[path = "json_extract_tests.rs"]
mod tests;
