//! Provider-aware rendering of raw stream lines for human-facing output.
//!
//! Only omp emits a JSON event stream worth cleaning; every other provider,
//! every stderr line, and anything that is not a typed JSON event passes
//! through unchanged.

use acap_core::{ProviderId, StreamRenderMode};
use acap_process::StreamName;
use serde_json::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamCleaner {
    pub mode: StreamRenderMode,
    /// Also render `thinking_delta` updates, prefixed with `[thinking] `.
    pub show_thinking: bool,
}

impl StreamCleaner {
    pub fn new(mode: StreamRenderMode, show_thinking: bool) -> Self {
        Self {
            mode,
            show_thinking,
        }
    }

    /// Render one raw line into zero or more display lines.
    pub fn ingest(&self, provider: ProviderId, stream: StreamName, raw_line: &str) -> Vec<String> {
        if self.mode == StreamRenderMode::Raw
            || stream != StreamName::Stdout
            || provider != ProviderId::Omp
        {
            return vec![raw_line.to_string()];
        }
        self.clean_omp_line(raw_line)
    }

    fn clean_omp_line(&self, raw_line: &str) -> Vec<String> {
        let Ok(payload) = serde_json::from_str::<Value>(raw_line) else {
            return vec![raw_line.to_string()];
        };
        let Some(event_type) = payload.get("type").and_then(Value::as_str) else {
            return vec![raw_line.to_string()];
        };
        let compact = self.mode == StreamRenderMode::Compact;

        if event_type == "message_update" {
            let Some(update_type) = payload
                .get("assistantMessageEvent")
                .and_then(|update| update.get("type"))
                .and_then(Value::as_str)
            else {
                return Vec::new();
            };
            let delta = payload
                .pointer("/assistantMessageEvent/delta")
                .and_then(Value::as_str)
                .filter(|delta| !delta.is_empty());

            return match update_type {
                "text_delta" => delta.map(str::to_string).into_iter().collect(),
                "thinking_delta" if self.show_thinking => delta
                    .map(|delta| format!("[thinking] {delta}"))
                    .into_iter()
                    .collect(),
                "text_start" | "text_end" if compact => vec![format!("[{update_type}]")],
                _ => Vec::new(),
            };
        }

        match event_type {
            "message_end" | "turn_start" | "turn_end" if compact => vec![format!("[{event_type}]")],
            _ => Vec::new(),
        }
    }
}
