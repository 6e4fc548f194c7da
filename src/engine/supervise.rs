use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt as _};
use tokio::process::Command;
use tokio::task::JoinHandle;

use super::process_tree;
use crate::foundation::error::{RenderError, RenderResult};

/// Bytes of each output stream retained for diagnostics.
pub const STREAM_TAIL_BYTES: usize = 64 * 1024;
/// Bytes of stderr quoted in a failure reason.
pub const STDERR_EXCERPT_BYTES: usize = 2 * 1024;

#[derive(Debug)]
pub struct ProcessExit {
    pub status: ExitStatus,
    pub stdout_tail: Vec<u8>,
    pub stderr_tail: Vec<u8>,
    pub elapsed: Duration,
}

impl ProcessExit {
    /// Exit status plus the last [`STDERR_EXCERPT_BYTES`] of stderr.
    pub fn failure_reason(&self, label: &str) -> String {
        let stderr = String::from_utf8_lossy(excerpt(&self.stderr_tail, STDERR_EXCERPT_BYTES));
        let stderr = stderr.trim();
        if stderr.is_empty() {
            format!("{label} exited with {}", self.status)
        } else {
            format!("{label} exited with {}: {stderr}", self.status)
        }
    }
}

/// Run `cmd` to completion or until `timeout` elapses, whichever comes first.
///
/// The child leads its own process group. A spawn failure is a launch error and returns before
/// the timer starts. On expiry the whole process tree is killed and the output drains get at
/// most `grace` to finish. Descendants still running after a normal exit are killed too.
pub async fn run_supervised(
    mut cmd: Command,
    label: &str,
    timeout: Duration,
    grace: Duration,
) -> RenderResult<ProcessExit> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|e| RenderError::launch(format!("failed to spawn {label}: {e}")))?;
    let started = Instant::now();
    let pid = child.id();
    tracing::debug!(pid, label, "process started");

    let stdout = child.stdout.take().map(|s| tokio::spawn(drain_tail(s)));
    let stderr = child.stderr.take().map(|s| tokio::spawn(drain_tail(s)));

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let elapsed = started.elapsed();
            if let Some(pid) = pid
                && process_tree::kill_group(pid)
            {
                tracing::warn!(
                    pid,
                    label,
                    %status,
                    "process exited with descendants still running, killed its group"
                );
            }
            Ok(ProcessExit {
                status,
                stdout_tail: join_drain(stdout, grace).await,
                stderr_tail: join_drain(stderr, grace).await,
                elapsed,
            })
        }
        Ok(Err(e)) => {
            terminate_tree(&mut child, pid).await;
            join_drain(stdout, grace).await;
            join_drain(stderr, grace).await;
            Err(RenderError::failed(format!("failed to wait for {label}: {e}")))
        }
        Err(_) => {
            tracing::warn!(pid, label, ?timeout, "deadline exceeded, killing process tree");
            terminate_tree(&mut child, pid).await;
            join_drain(stdout, grace).await;
            join_drain(stderr, grace).await;
            Err(RenderError::TimedOut(timeout))
        }
    }
}

async fn terminate_tree(child: &mut tokio::process::Child, pid: Option<u32>) {
    // Snapshot before the root dies; orphans lose their parent link once it is reaped.
    // The group kill covers orphans; the walk covers descendants that left the group.
    let descendants = pid.map(process_tree::descendants).unwrap_or_default();
    let group = pid.is_some_and(process_tree::kill_group);
    if let Err(e) = child.start_kill() {
        tracing::debug!(error = %e, "root process already gone");
    }
    let killed = process_tree::kill_all(&descendants);
    if let Err(e) = child.wait().await {
        tracing::warn!(error = %e, "failed to reap killed process");
    }
    tracing::debug!(
        descendants = descendants.len(),
        group,
        killed,
        "process tree terminated"
    );
}

async fn drain_tail<R: AsyncRead + Unpin>(mut reader: R) -> std::io::Result<Vec<u8>> {
    let mut tail = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(tail);
        }
        tail.extend_from_slice(&buf[..n]);
        if tail.len() > STREAM_TAIL_BYTES {
            let excess = tail.len() - STREAM_TAIL_BYTES;
            tail.drain(..excess);
        }
    }
}

async fn join_drain(
    handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    grace: Duration,
) -> Vec<u8> {
    let Some(mut handle) = handle else {
        return Vec::new();
    };
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(Ok(Ok(bytes))) => bytes,
        Ok(Ok(Err(e))) => {
            tracing::warn!(error = %e, "failed to read process output");
            Vec::new()
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "output drain task failed");
            Vec::new()
        }
        Err(_) => {
            // Something outside the tree still holds the pipe open.
            handle.abort();
            tracing::warn!(?grace, "output drain did not finish within grace period");
            Vec::new()
        }
    }
}

fn excerpt(bytes: &[u8], max: usize) -> &[u8] {
    &bytes[bytes.len().saturating_sub(max)..]
}
