//! External command execution.
//!
//! Everything minivirt does to the host — ISO mastering, disk resize,
//! hypervisor import — goes through one narrow seam: run a shell command
//! line, get back its combined output and exit code. A non-zero exit is
//! *not* an error here; callers decide what is fatal, which lets them
//! accumulate command output into the VM log regardless of outcome.

use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::error::MinivirtError;

/// Commands that outlive this are forcibly killed.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Sentinel exit code reported when a command was killed at the timeout.
/// Distinguishable from signal deaths, which map to `128 + signo`.
pub const TIMEOUT_EXIT_CODE: i32 = -1;

/// Combined output and exit code of a finished (or killed) command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// stdout and stderr interleaved. Ordering across the two streams is
    /// best-effort, not byte-exact.
    pub output: String,
    pub code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Seam for running external tools. The production impl shells out; tests
/// substitute a scripted double.
#[allow(async_fn_in_trait)] // trait is internal-only
pub trait Runner {
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, MinivirtError>;
}

/// Runs command lines through `sh -c`, so shell quoting embedded in the
/// command line is honored.
pub struct ShellRunner;

impl Runner for ShellRunner {
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput, MinivirtError> {
        tracing::debug!(command, "running external command");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MinivirtError::Io {
                context: format!("spawning shell for command: {command}"),
                source: e,
            })?;

        let buf: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        let mut out_task = match child.stdout.take() {
            Some(stdout) => tokio::spawn(pump(stdout, buf.clone())),
            None => tokio::spawn(async {}),
        };
        let mut err_task = match child.stderr.take() {
            Some(stderr) => tokio::spawn(pump(stderr, buf.clone())),
            None => tokio::spawn(async {}),
        };

        let (code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => (exit_code(status), false),
            Ok(Err(e)) => {
                return Err(MinivirtError::Io {
                    context: format!("waiting for command: {command}"),
                    source: e,
                });
            }
            Err(_) => {
                tracing::warn!(command, ?timeout, "command timed out, killing");
                let _ = child.start_kill();
                let _ = child.wait().await;
                (TIMEOUT_EXIT_CODE, true)
            }
        };

        // Drain whatever output made it out. After a kill the pipes may be
        // held open by grandchildren, so only wait briefly in that case.
        let drain = async {
            let _ = (&mut out_task).await;
            let _ = (&mut err_task).await;
        };
        if timed_out {
            if tokio::time::timeout(Duration::from_secs(1), drain).await.is_err() {
                out_task.abort();
                err_task.abort();
            }
        } else {
            drain.await;
        }

        let output = {
            let bytes = buf.lock().unwrap_or_else(|e| e.into_inner());
            String::from_utf8_lossy(&bytes).into_owned()
        };

        tracing::debug!(command, code, "command finished");
        Ok(CommandOutput { output, code })
    }
}

/// Copy a child stream into the shared buffer chunk by chunk.
async fn pump<R: AsyncRead + Unpin>(mut reader: R, buf: Arc<Mutex<Vec<u8>>>) {
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                let mut guard = buf.lock().unwrap_or_else(|e| e.into_inner());
                guard.extend_from_slice(&chunk[..n]);
            }
        }
    }
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(TIMEOUT_EXIT_CODE)
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(TIMEOUT_EXIT_CODE)
}

/// Last non-empty line of a command's combined output — CLI tools put their
/// terminal error message last, so this is what surfaces to the operator.
pub fn last_line(output: &str) -> &str {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
}

// ── Test double ──────────────────────────────────────────
