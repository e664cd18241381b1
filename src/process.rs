//! External process execution with concurrent output capture and cancellation.

use std::ffi::OsStr;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, SubgenError};

/// Captured result of a process that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stderr trimmed for use in error messages, falling back to the exit code.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        match self.exit_code {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Spawns one process per call and reaps it on every exit path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `program` with `args` until it exits or `cancel` fires.
    ///
    /// Returns [`SubgenError::Cancelled`] when the token fires first; the child
    /// is killed and waited for before returning.
    pub async fn run<S, I, A>(
        &self,
        program: S,
        args: I,
        label: &str,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput>
    where
        S: AsRef<OsStr>,
        I: IntoIterator<Item = A>,
        A: AsRef<OsStr>,
    {
        if cancel.is_cancelled() {
            return Err(SubgenError::Cancelled);
        }

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Spawning {}: {:?}", label, cmd.as_std());
        let mut child = cmd.spawn()?;

        let stdout_task = child.stdout.take().map(|s| drain_lines(s, label, "stdout"));
        let stderr_task = child.stderr.take().map(|s| drain_lines(s, label, "stderr"));

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Cancelling {} (pid {:?})", label, child.id());
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", label, e);
                }
                abort_reader(stdout_task);
                abort_reader(stderr_task);
                return Err(SubgenError::Cancelled);
            }
            status = child.wait() => status?,
        };

        // A grandchild can keep the pipes open after the child exits
        let stdout_abort = stdout_task.as_ref().map(JoinHandle::abort_handle);
        let stderr_abort = stderr_task.as_ref().map(JoinHandle::abort_handle);
        let (stdout, stderr) = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Cancelling {} while draining its output", label);
                for handle in stdout_abort.into_iter().chain(stderr_abort) {
                    handle.abort();
                }
                return Err(SubgenError::Cancelled);
            }
            output = async {
                tokio::join!(collect_reader(stdout_task), collect_reader(stderr_task))
            } => output,
        };

        debug!("{} finished with {:?}", label, status.code());
        Ok(ProcessOutput {
            exit_code: status.code(),
            stdout,
            stderr,
        })
    }
}

fn drain_lines<R>(reader: R, label: &str, stream: &'static str) -> JoinHandle<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let label = label.to_string();
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut captured = String::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    debug!("[{} {}] {}", label, stream, line.trim_end());
                    captured.push_str(&line);
                }
                Err(e) => {
                    warn!("Failed reading {} {}: {}", label, stream, e);
                    break;
                }
            }
        }
        captured
    })
}

async fn collect_reader(task: Option<JoinHandle<String>>) -> String {
    match task {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

fn abort_reader(task: Option<JoinHandle<String>>) {
    if let Some(handle) = task {
        handle.abort();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tokio_test::assert_err;

    #[tokio::test]
    async fn test_captures_both_streams_and_exit_code() {
        let output = ProcessRunner::new()
            .run(
                "sh",
                ["-c", "echo one; echo two; echo oops >&2; exit 3"],
                "sh",
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
        assert_eq!(output.stdout, "one\ntwo\n");
        assert_eq!(output.stderr, "oops\n");
        assert_eq!(output.diagnostic(), "oops");
    }

    #[tokio::test]
    async fn test_large_output_does_not_deadlock() {
        // Well past a 64 KiB pipe buffer on both streams.
        let script = "i=0; while [ $i -lt 5000 ]; do \
                      echo 'xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx'; \
                      echo 'yyyyyyyyyyyyyyyyyyyyyyyyyyyyyyyy' >&2; \
                      i=$((i+1)); done";
        let output = ProcessRunner::new()
            .run("sh", ["-c", script], "sh", &CancellationToken::new())
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.lines().count(), 5000);
        assert_eq!(output.stderr.lines().count(), 5000);
    }

    #[tokio::test]
    async fn test_cancellation_kills_process() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = ProcessRunner::new()
            .run("sleep", ["30"], "sleep", &cancel)
            .await;

        assert!(matches!(result, Err(SubgenError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancellation_while_grandchild_holds_pipes() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let result = ProcessRunner::new()
            .run("sh", ["-c", "sleep 8 & echo started"], "sh", &cancel)
            .await;

        assert!(matches!(result, Err(SubgenError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_already_cancelled_does_not_spawn() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = ProcessRunner::new()
            .run("definitely-not-a-real-binary", ["--version"], "missing", &cancel)
            .await;
        assert!(matches!(result, Err(SubgenError::Cancelled)));
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let result = ProcessRunner::new()
            .run(
                "definitely-not-a-real-binary",
                ["--version"],
                "missing",
                &CancellationToken::new(),
            )
            .await;
        let err = assert_err!(result);
        assert!(matches!(err, SubgenError::Io(_)));
    }
}
