//! Diagnostic log file setup for the `acap` binary.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;

/// Create a non-blocking file writer for tracing output.
///
/// The returned guard must outlive every log call; dropping it flushes the
/// writer. Files land in `{dir}/logs/run-{timestamp}.log`.
pub fn create_run_log_writer(
    dir: &Path,
) -> Result<(
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
)> {
    let log_dir = dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log dir: {}", log_dir.display()))?;

    let file_name = format!("run-{}.log", Utc::now().format("%Y%m%d-%H%M%S"));
    let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
    Ok(tracing_appender::non_blocking(file_appender))
}
