//! Streaming subprocess execution.
//!
//! [`run_streaming`] spawns the build tool, drains stdout and stderr in two
//! concurrent read loops that forward every line to a single channel, and
//! resolves once the process exits. The child is spawned with
//! `kill_on_drop(true)`, so it is reaped on every exit path including
//! timeouts and task cancellation.

use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::time::error::Elapsed;

use super::command::BuildCommand;
use super::error::BuildError;

/// One slice of build tool output, tagged with the stream it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(String),
    Stderr(String),
}

/// How the build tool finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Run `command` inside `working_dir`, forwarding output to `chunks`.
///
/// Output is forwarded line by line (newline included) as soon as it is
/// read. The receiving side of `chunks` sees the channel close once both
/// streams are drained, which always happens before this function returns.
///
/// `timeout` bounds the process and the draining of its output together,
/// measured from spawn. `None` waits indefinitely.
pub async fn run_streaming(
    command: &BuildCommand,
    working_dir: &Path,
    timeout: Option<Duration>,
    chunks: mpsc::UnboundedSender<OutputChunk>,
) -> Result<ProcessExit, BuildError> {
    let mut cmd = command.to_command(working_dir);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let deadline = timeout.map(|limit| tokio::time::Instant::now() + limit);
    let mut child = cmd.spawn().map_err(BuildError::BuildToolCrashed)?;
    tracing::debug!(pid = child.id(), command = %command, "Build tool spawned");

    let mut stdout_task = tokio::spawn(forward_lines(
        child.stdout.take(),
        chunks.clone(),
        OutputChunk::Stdout,
    ));
    let mut stderr_task = tokio::spawn(forward_lines(
        child.stderr.take(),
        chunks,
        OutputChunk::Stderr,
    ));

    let status = match until(deadline, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            stdout_task.abort();
            stderr_task.abort();
            return Err(BuildError::BuildToolCrashed(e));
        }
        Err(_elapsed) => {
            if let Err(e) = child.kill().await {
                tracing::warn!(error = %e, "Failed to kill timed out build tool");
            }
            stdout_task.abort();
            stderr_task.abort();
            return Err(BuildError::TimedOut {
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }
    };

    // The readers end at EOF, which a surviving grandchild holding the pipes
    // can postpone indefinitely. The same deadline bounds the drain.
    let drained = until(deadline, async {
        tokio::join!(&mut stdout_task, &mut stderr_task)
    })
    .await;

    match drained {
        Ok((stdout, stderr)) => {
            for (stream, joined) in [("stdout", stdout), ("stderr", stderr)] {
                if let Err(e) = joined {
                    tracing::warn!(stream, error = %e, "Build output reader ended abnormally");
                }
            }
            Ok(ProcessExit {
                exit_code: status.code().unwrap_or(-1),
                duration_ms: start.elapsed().as_millis() as u64,
            })
        }
        Err(_elapsed) => {
            tracing::warn!(
                exit_code = status.code(),
                "Build tool exited but its output pipes stayed open past the deadline"
            );
            stdout_task.abort();
            stderr_task.abort();
            Err(BuildError::TimedOut {
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        }
    }
}

/// Await `fut`, giving up at `deadline` if there is one.
async fn until<F: Future>(
    deadline: Option<tokio::time::Instant>,
    fut: F,
) -> Result<F::Output, Elapsed> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await,
        None => Ok(fut.await),
    }
}

/// Read `handle` line by line and forward each line through `sink`.
///
/// Invalid UTF-8 is replaced rather than ending the stream. Stops at EOF,
/// on a read error, or when the receiver is gone.
async fn forward_lines<R, F>(handle: Option<R>, sink: mpsc::UnboundedSender<OutputChunk>, wrap: F)
where
    R: AsyncRead + Unpin,
    F: Fn(String) -> OutputChunk,
{
    let Some(handle) = handle else {
        return;
    };
    let mut reader = BufReader::new(handle);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf).into_owned();
                if sink.send(wrap(text)).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Build output stream read failed");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
