//! Process management: spawning, concurrent stream draining, and output capture.

use acap_core::AppError;
use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

mod lib_output_helpers;
pub use lib_output_helpers::{failure_summary, last_non_empty_line, truncate_line};
use lib_output_helpers::extract_summary;

/// Result of executing a command.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Exit code (1 if signal-killed).
    pub exit_code: i32,
    /// Captured stdout, byte-for-byte apart from lossy UTF-8 decoding.
    pub stdout: String,
    /// Captured stderr.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    /// Last non-empty line (max 200 chars); failure summary on non-zero exit.
    pub summary: String,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Stdout and stderr concatenated, used for marker scanning.
    pub fn combined_output(&self) -> String {
        let mut combined = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        combined.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&self.stderr);
        combined
    }
}

/// Which child stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdout,
    Stderr,
}

impl StreamName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for StreamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of child output, without its terminator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamEvent {
    pub stream: StreamName,
    pub line: String,
}

/// Per-line observer invoked from the consumer loop.
pub type StreamSink<'a> = &'a mut (dyn FnMut(&StreamEvent) + Send);

#[derive(Debug)]
enum Message {
    /// A line and whether the child terminated it with `\n`.
    Line(StreamEvent, bool),
    Done(StreamName),
}

/// Spawn `cmd` with piped stdout/stderr in its own session.
///
/// Spawn failures surface as [`AppError::LaunchFailed`], distinct from a
/// non-zero exit of a process that did start.
fn launch(mut cmd: Command, pipe_stdin: bool) -> Result<Child> {
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.stdin(if pipe_stdin {
        std::process::Stdio::piped()
    } else {
        std::process::Stdio::null()
    });

    // Isolate child in its own session so terminal signals aimed at the
    // caller do not reach the agent.
    // SAFETY: setsid() is async-signal-safe and we call it before exec,
    // so no Rust runtime state exists in the child yet.
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let binary = cmd.as_std().get_program().to_string_lossy().into_owned();
    cmd.spawn().map_err(|err| {
        anyhow::Error::from(AppError::LaunchFailed {
            binary,
            reason: err.to_string(),
        })
    })
}

/// Spawn a tool process without waiting for it to complete.
///
/// When `stdin_data` is given, it is written from a background task and the
/// pipe is closed afterwards; otherwise stdin is `/dev/null`. Use
/// [`wait_and_capture`] to collect the result.
pub async fn spawn_tool(cmd: Command, stdin_data: Option<Vec<u8>>) -> Result<Child> {
    let mut child = launch(cmd, stdin_data.is_some())?;
    if let Some(data) = stdin_data
        && let Some(stdin) = child.stdin.take()
    {
        tokio::spawn(write_stdin(stdin, data));
    }
    Ok(child)
}

/// Wait for a spawned child process and capture its output.
///
/// Both stdout and stderr must be piped (as [`spawn_tool`] does); this takes
/// ownership of both handles.
pub async fn wait_and_capture(child: Child) -> Result<ExecutionResult> {
    drain(child, None, None).await
}

/// Execute a command and capture output.
pub async fn run_and_capture(cmd: Command) -> Result<ExecutionResult> {
    let child = spawn_tool(cmd, None).await?;
    wait_and_capture(child).await
}

/// Run `cmd` to completion while forwarding every output line to `sink`.
///
/// Stdout and stderr are drained concurrently by one reader task each, so a
/// child filling either pipe can never deadlock the run. Lines of one stream
/// reach the sink in the order the child wrote them; interleaving across the
/// two streams is best-effort. The exit code is collected only after both
/// streams reached EOF.
///
/// Dropping the returned future does not kill the child.
pub async fn run_streaming(
    cmd: Command,
    stdin_data: Option<Vec<u8>>,
    sink: Option<StreamSink<'_>>,
) -> Result<ExecutionResult> {
    let child = launch(cmd, stdin_data.is_some())?;
    drain(child, stdin_data, sink).await
}

async fn drain(
    mut child: Child,
    stdin_data: Option<Vec<u8>>,
    sink: Option<StreamSink<'_>>,
) -> Result<ExecutionResult> {
    let stdout = child.stdout.take().context("Failed to capture stdout")?;
    let stderr = child.stderr.take().context("Failed to capture stderr")?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(read_lines(stdout, StreamName::Stdout, tx.clone()));
    tokio::spawn(read_lines(stderr, StreamName::Stderr, tx));

    if let Some(data) = stdin_data
        && let Some(stdin) = child.stdin.take()
    {
        write_stdin(stdin, data).await;
    }

    let (stdout_buf, stderr_buf) = collect_streams(&mut rx, sink).await?;

    let status = child.wait().await.context("Failed to wait for command")?;
    let exit_code = status.code().unwrap_or_else(|| {
        warn!("Process terminated by signal, using exit code 1");
        1
    });

    let summary = if exit_code == 0 {
        extract_summary(&stdout_buf)
    } else {
        failure_summary(&stdout_buf, &stderr_buf, exit_code)
    };

    Ok(ExecutionResult {
        exit_code,
        stdout: stdout_buf,
        stderr: stderr_buf,
        summary,
    })
}

/// Accumulate both streams until each reader has reported EOF.
async fn collect_streams(
    rx: &mut mpsc::UnboundedReceiver<Message>,
    mut sink: Option<StreamSink<'_>>,
) -> Result<(String, String)> {
    let mut stdout_buf = String::new();
    let mut stderr_buf = String::new();
    let mut completed = 0;
    while completed < 2 {
        match rx.recv().await {
            Some(Message::Line(event, terminated)) => {
                if let Some(sink) = sink.as_mut() {
                    sink(&event);
                }
                let buf = match event.stream {
                    StreamName::Stdout => &mut stdout_buf,
                    StreamName::Stderr => &mut stderr_buf,
                };
                buf.push_str(&event.line);
                if terminated {
                    buf.push('\n');
                }
            }
            Some(Message::Done(stream)) => {
                debug!(%stream, "stream reached EOF");
                completed += 1;
            }
            // Both senders dropped without sentinels: a reader task panicked.
            None => anyhow::bail!("stream reader exited before EOF"),
        }
    }
    Ok((stdout_buf, stderr_buf))
}

async fn read_lines<R>(handle: R, stream: StreamName, tx: mpsc::UnboundedSender<Message>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(handle);
    let mut raw = Vec::new();
    loop {
        raw.clear();
        match reader.read_until(b'\n', &mut raw).await {
            Ok(0) => break,
            Ok(_) => {
                let terminated = raw.last() == Some(&b'\n');
                if terminated {
                    raw.pop();
                }
                let line = String::from_utf8_lossy(&raw).into_owned();
                let event = StreamEvent { stream, line };
                if tx.send(Message::Line(event, terminated)).is_err() {
                    return;
                }
            }
            Err(err) => {
                warn!(%stream, error = %err, "stream read failed; treating as EOF");
                break;
            }
        }
    }
    let _ = tx.send(Message::Done(stream));
}

async fn write_stdin(mut stdin: tokio::process::ChildStdin, data: Vec<u8>) {
    // A child that exits without reading its input yields EPIPE here.
    if let Err(err) = stdin.write_all(&data).await {
        debug!(error = %err, "stdin write failed");
    }
    if let Err(err) = stdin.shutdown().await {
        debug!(error = %err, "stdin close failed");
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
