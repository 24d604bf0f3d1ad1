//! Append-only JSONL run log: one record per stream line or lifecycle event.
//!
//! Logging never fails a run. The first write error is reported with
//! `warn!` and disables the logger for the rest of the run.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use acap_core::ProviderId;
use acap_process::StreamName;
use anyhow::{Context, Result};
use chrono::SecondsFormat;
use serde::Serialize;
use tracing::warn;

pub const SESSION_STARTED: &str = "session_started";
pub const SESSION_FINISHED: &str = "session_finished";

/// Kind of record written to the run log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunEventType {
    /// One line of child stdout/stderr.
    Stream,
    /// Start/finish markers around a provider invocation.
    Lifecycle,
}

#[derive(Serialize)]
struct RunLogRecord<'a> {
    ts: String,
    run_id: &'a str,
    phase: &'a str,
    event_type: RunEventType,
    stream: Option<StreamName>,
    provider: &'a str,
    model: &'a str,
    project_dir: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<&'a BTreeMap<String, String>>,
}

#[derive(Debug)]
pub struct RunLogger {
    run_id: String,
    provider: String,
    model: String,
    project_dir: String,
    log_file: Option<PathBuf>,
    writer: Option<File>,
    write_failed: bool,
}

impl RunLogger {
    /// Create a logger for one run.
    ///
    /// The file `{YYYYMMDDTHHMMSSZ}_{provider}_{model}_{run_id}.jsonl` is
    /// created lazily on the first event. A disabled logger, or one whose
    /// directory cannot be created, is a no-op.
    pub fn create(
        enabled: bool,
        base_dir: &Path,
        provider: ProviderId,
        model: &str,
        project_dir: &Path,
    ) -> Self {
        let run_id = ulid::Ulid::new().to_string().to_ascii_lowercase();
        let mut logger = Self {
            run_id,
            provider: provider.as_str().to_string(),
            model: model.to_string(),
            project_dir: project_dir.display().to_string(),
            log_file: None,
            writer: None,
            write_failed: false,
        };
        if !enabled {
            return logger;
        }

        if let Err(err) = std::fs::create_dir_all(base_dir) {
            warn!(
                dir = %base_dir.display(),
                error = %err,
                "failed to create run log directory; run logging disabled"
            );
            return logger;
        }

        let filename = format!(
            "{}_{}_{}_{}.jsonl",
            chrono::Utc::now().format("%Y%m%dT%H%M%SZ"),
            sanitize_label(&logger.provider),
            sanitize_label(&logger.model),
            logger.run_id,
        );
        logger.log_file = Some(base_dir.join(filename));
        logger
    }

    /// Logger that never writes anything.
    pub fn disabled(provider: ProviderId, model: &str, project_dir: &Path) -> Self {
        Self::create(false, Path::new(""), provider, model, project_dir)
    }

    pub fn enabled(&self) -> bool {
        self.log_file.is_some() && !self.write_failed
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    pub fn log_stream(&mut self, phase: &str, stream: StreamName, line: &str) {
        self.log_event(phase, RunEventType::Stream, line, Some(stream), None);
    }

    pub fn log_lifecycle(
        &mut self,
        phase: &str,
        message: &str,
        meta: Option<&BTreeMap<String, String>>,
    ) {
        self.log_event(phase, RunEventType::Lifecycle, message, None, meta);
    }

    pub fn log_event(
        &mut self,
        phase: &str,
        event_type: RunEventType,
        message: &str,
        stream: Option<StreamName>,
        meta: Option<&BTreeMap<String, String>>,
    ) {
        if !self.enabled() {
            return;
        }
        let Some(path) = self.log_file.clone() else {
            return;
        };

        let record = RunLogRecord {
            ts: chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            run_id: &self.run_id,
            phase,
            event_type,
            stream,
            provider: &self.provider,
            model: &self.model,
            project_dir: &self.project_dir,
            message,
            meta: meta.filter(|m| !m.is_empty()),
        };
        let mut line = match serde_json::to_vec(&record) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "failed to serialize run log record");
                return;
            }
        };
        line.push(b'\n');

        if let Err(err) = self.append(&path, &line) {
            warn!(
                path = %path.display(),
                error = %err,
                "failed to write run log; run logging disabled"
            );
            self.write_failed = true;
            self.writer = None;
        }
    }

    fn append(&mut self, path: &Path, line: &[u8]) -> std::io::Result<()> {
        if self.writer.is_none() {
            self.writer = Some(OpenOptions::new().create(true).append(true).open(path)?);
        }
        if let Some(file) = self.writer.as_mut() {
            file.write_all(line)?;
            file.flush()?;
        }
        Ok(())
    }
}

/// Lowercase, collapse runs of characters outside `[a-z0-9._-]` into `-`.
pub fn sanitize_label(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    let mut cleaned = String::with_capacity(lowered.len());
    let mut in_run = false;
    for ch in lowered.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() || matches!(ch, '.' | '_' | '-') {
            cleaned.push(ch);
            in_run = false;
        } else if !in_run {
            cleaned.push('-');
            in_run = true;
        }
    }
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Newest `.jsonl` file in `dir` by modification time.
pub fn find_latest_run_log(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "jsonl"))
        .filter_map(|path| {
            let modified = path.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, path))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, path)| path)
}

/// Last `count` lines of a text file, terminators stripped.
pub fn read_last_lines(path: &Path, count: usize) -> Result<Vec<String>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let file =
        File::open(path).with_context(|| format!("Failed to open run log: {}", path.display()))?;
    let mut tail = std::collections::VecDeque::with_capacity(count);
    for line in BufReader::new(file).lines() {
        let line = line.with_context(|| format!("Failed to read run log: {}", path.display()))?;
        if tail.len() == count {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    Ok(tail.into())
}

#[cfg(test)]
#[path = "run_log_tests.rs"]
mod tests;
