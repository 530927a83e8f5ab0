//! Subprocess execution on tokio.
//!
//! Streamed commands have stdout and stderr merged line by line, in the order
//! lines become available. Captured commands return stdout only; their stderr
//! is logged when they fail.

use std::future::Future;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use nomad_service_sdk::{CommandError, ProgressSink};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::domain::runner::CommandRunner;

type LineStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Runs commands as child processes of the daemon.
///
/// Children are always awaited. Without a timeout they run to completion even
/// if the client that triggered them went away; with a timeout they are killed
/// once it elapses.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    fn command(&self, argv: &[String]) -> Result<(String, Command), CommandError> {
        let (program, args) = argv.split_first().ok_or(CommandError::EmptyCommand)?;
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(self.timeout.is_some());
        Ok((program.clone(), cmd))
    }

    async fn bounded<T>(
        &self,
        program: &str,
        fut: impl Future<Output = Result<T, CommandError>>,
    ) -> Result<T, CommandError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
                tracing::warn!(%program, secs = limit.as_secs(), "Command timed out, killing it");
                CommandError::Timeout {
                    program: program.to_owned(),
                    secs: limit.as_secs(),
                }
            })?,
            None => fut.await,
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn stream(&self, argv: &[String], progress: &ProgressSink) -> Result<(), CommandError> {
        let (program, mut cmd) = self.command(argv)?;
        tracing::debug!(command = %argv.join(" "), "Running command");

        let mut child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let io_error = |source| CommandError::Io {
            program: program.clone(),
            source,
        };

        let run = async {
            let mut lines = futures::stream::select(read_lines(stdout), read_lines(stderr));
            while let Some(line) = lines.next().await {
                progress.line(line.map_err(io_error)?).await;
            }
            let status = child.wait().await.map_err(io_error)?;
            check_status(&program, status)
        };
        self.bounded(&program, run).await
    }

    async fn capture(&self, argv: &[String]) -> Result<Vec<u8>, CommandError> {
        let (program, mut cmd) = self.command(argv)?;
        tracing::debug!(command = %argv.join(" "), "Running command");

        let child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?;

        let run = async {
            let output = child
                .wait_with_output()
                .await
                .map_err(|source| CommandError::Io {
                    program: program.clone(),
                    source,
                })?;
            if !output.status.success() {
                tracing::warn!(
                    %program,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim_end(),
                    "Command failed"
                );
            }
            check_status(&program, output.status)?;
            Ok(output.stdout)
        };
        self.bounded(&program, run).await
    }
}

fn check_status(program: &str, status: ExitStatus) -> Result<(), CommandError> {
    if status.success() {
        return Ok(());
    }
    Err(CommandError::Exit {
        program: program.to_owned(),
        code: status.code(),
        status: status.to_string(),
    })
}

// Splits on `\n` without requiring UTF-8; a final unterminated line gets one.
fn read_lines<R>(reader: Option<R>) -> LineStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(reader) = reader else {
        return Box::pin(futures::stream::empty());
    };
    Box::pin(try_stream! {
        let mut reader = BufReader::new(reader);
        loop {
            let mut buf = Vec::new();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            if buf.last() != Some(&b'\n') {
                buf.push(b'\n');
            }
            yield Bytes::from(buf);
        }
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::domain::runner::argv;
    use crate::test_support::collect_progress;

    fn sh(script: &str) -> Vec<String> {
        argv(["sh", "-c", script])
    }

    #[tokio::test]
    async fn stream_merges_stdout_and_stderr() {
        let runner = ProcessRunner::default();
        let (sink, rx) = ProgressSink::channel("test", 16);
        runner
            .stream(&sh("echo out; echo err >&2; printf tail"), &sink)
            .await
            .unwrap();
        drop(sink);

        let (text, aborted) = collect_progress(rx).await;
        assert!(!aborted);
        let mut lines: Vec<&str> = text.lines().collect();
        lines.sort_unstable();
        assert_eq!(lines, vec!["err", "out", "tail"]);
    }

    #[tokio::test]
    async fn stream_reports_non_zero_exit_after_output() {
        let runner = ProcessRunner::default();
        let (sink, rx) = ProgressSink::channel("test", 16);
        let err = runner
            .stream(&sh("echo partial; exit 3"), &sink)
            .await
            .unwrap_err();
        drop(sink);

        assert!(matches!(err, CommandError::Exit { code: Some(3), .. }));
        let (text, _) = collect_progress(rx).await;
        assert_eq!(text, "partial\n");
    }

    #[tokio::test]
    async fn capture_returns_stdout_only() {
        let runner = ProcessRunner::default();
        let out = runner
            .capture(&sh("printf '{\"Items\":{}}'; echo noise >&2"))
            .await
            .unwrap();
        assert_eq!(out, b"{\"Items\":{}}");
    }

    #[tokio::test]
    async fn capture_preserves_non_utf8() {
        let runner = ProcessRunner::default();
        let out = runner.capture(&sh("printf '\\377\\376'")).await.unwrap();
        assert_eq!(out, vec![0xff, 0xfe]);
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let runner = ProcessRunner::default();
        let err = runner
            .capture(&argv(["/nonexistent/definitely-not-here"]))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[tokio::test]
    async fn empty_argv_is_rejected() {
        let runner = ProcessRunner::default();
        let err = runner.capture(&[]).await.unwrap_err();
        assert!(matches!(err, CommandError::EmptyCommand));
    }

    #[tokio::test]
    async fn timeout_kills_long_running_command() {
        let runner = ProcessRunner::new(Some(Duration::from_millis(200)));
        let err = runner
            .stream(&sh("sleep 30"), &ProgressSink::log_only("test"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
    }
}
