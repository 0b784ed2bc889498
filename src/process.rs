//! Supervised execution of external tools.
//!
//! Every downloader and ffmpeg invocation goes through [`ProcessRunner`]. The
//! runner watches stdout and stderr line by line; lines recognized as progress
//! push back an idle deadline, and a process that stays quiet past the
//! deadline is killed and reported as a stall.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::error::{CutterError, Result};
use crate::media::MediaCommand;
use crate::parse::ProgressMatcher;

/// Maximum number of characters of diagnostics carried in a failure.
const DIAGNOSTIC_TAIL_CHARS: usize = 1500;

const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const SPAWN_RETRIES: u32 = 5;

/// Captured output of a successful run.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

enum Outcome {
    Exited(ExitStatus),
    Stalled,
}

#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    matcher: ProgressMatcher,
}

impl ProcessRunner {
    pub fn new(matcher: ProgressMatcher) -> Self {
        Self { matcher }
    }

    /// Run `command` to completion, failing if it stays idle longer than `idle_timeout`.
    pub async fn run(&self, command: &MediaCommand, idle_timeout: Duration) -> Result<ProcessOutput> {
        let tool = command.tool_name();
        debug!("Running {}: {} {:?}", command.description, command.binary_path, command.args);

        let mut cmd = Command::new(&command.binary_path);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = spawn_with_retry(&mut cmd).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                CutterError::ToolMissing(format!("{} ({})", command.binary_path, e))
            }
            _ => CutterError::Io(e),
        })?;

        let (tx, mut rx) = mpsc::unbounded_channel::<(Stream, String)>();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(tokio::spawn(forward_lines(stdout, Stream::Stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(tokio::spawn(forward_lines(stderr, Stream::Stderr, tx.clone())));
        }
        drop(tx);

        let mut output = ProcessOutput::default();
        let mut deadline = Instant::now() + idle_timeout;

        let outcome = loop {
            tokio::select! {
                status = child.wait() => break Outcome::Exited(status?),
                Some((stream, line)) = rx.recv() => {
                    if self.matcher.is_progress(&line) {
                        deadline = Instant::now() + idle_timeout;
                    }
                    output.push(stream, &line);
                }
                _ = sleep_until(deadline) => break Outcome::Stalled,
            }
        };

        match outcome {
            Outcome::Stalled => {
                warn!(
                    "{} produced no progress for {}s, killing process",
                    tool,
                    idle_timeout.as_secs()
                );
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill stalled {}: {}", tool, e);
                }
                for reader in readers {
                    reader.abort();
                }
                Err(CutterError::Stall {
                    tool,
                    idle_secs: idle_timeout.as_secs(),
                })
            }
            Outcome::Exited(status) => {
                // A detached grandchild may hold the pipes open; do not wait on it forever.
                for reader in readers {
                    let _ = tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await;
                }
                while let Ok((stream, line)) = rx.try_recv() {
                    output.push(stream, &line);
                }

                if status.success() {
                    Ok(output)
                } else {
                    Err(CutterError::ToolFailed {
                        tool,
                        code: status.code(),
                        tail: output.diagnostic_tail(),
                    })
                }
            }
        }
    }
}

impl ProcessOutput {
    fn push(&mut self, stream: Stream, line: &str) {
        let buf = match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        };
        buf.push_str(line);
        buf.push('\n');
    }

    /// Last characters of stderr, or stdout when stderr is empty.
    pub fn diagnostic_tail(&self) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        tail_chars(source.trim_end(), DIAGNOSTIC_TAIL_CHARS)
    }
}

/// Executing a freshly written binary can race with another fork still holding
/// its write handle (ETXTBSY); such spawns are retried briefly.
async fn spawn_with_retry(cmd: &mut Command) -> std::io::Result<Child> {
    const ETXTBSY: i32 = 26;
    let mut attempt = 0;
    loop {
        match cmd.spawn() {
            Err(e) if e.raw_os_error() == Some(ETXTBSY) && attempt < SPAWN_RETRIES => {
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
            }
            other => return other,
        }
    }
}

fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    let skipped: String = text.chars().skip(count - max).collect();
    format!("...{}", skipped)
}

/// Split a byte stream on `\n` and `\r`; progress redraws use bare carriage returns.
async fn forward_lines<R>(mut reader: R, stream: Stream, tx: mpsc::UnboundedSender<(Stream, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 8192];
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &byte in &buf[..n] {
            if byte == b'\n' || byte == b'\r' {
                if !pending.is_empty() {
                    let line = String::from_utf8_lossy(&pending).into_owned();
                    pending.clear();
                    if tx.send((stream, line)).is_err() {
                        return;
                    }
                }
            } else {
                pending.push(byte);
            }
        }
    }

    if !pending.is_empty() {
        let _ = tx.send((stream, String::from_utf8_lossy(&pending).into_owned()));
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> MediaCommand {
        MediaCommand::new("sh", "shell test").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn collects_stdout_and_stderr_on_success() {
        let runner = ProcessRunner::default();
        let output = runner
            .run(&sh("echo 65.0; echo 'silence_start: 2' >&2"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "65.0");
        assert!(output.stderr.contains("silence_start: 2"));
    }

    #[tokio::test]
    async fn carriage_returns_split_lines() {
        let runner = ProcessRunner::default();
        let output = runner
            .run(&sh("printf 'a\\rb\\r\\nc'"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.stdout, "a\nb\nc\n");
    }

    #[tokio::test]
    async fn non_zero_exit_carries_diagnostic_tail() {
        let runner = ProcessRunner::default();
        let err = runner
            .run(&sh("echo 'Invalid argument' >&2; exit 3"), Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            CutterError::ToolFailed { tool, code, tail } => {
                assert_eq!(tool, "sh");
                assert_eq!(code, Some(3));
                assert_eq!(tail, "Invalid argument");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn quiet_process_is_killed_as_stall() {
        let runner = ProcessRunner::default();
        let started = std::time::Instant::now();
        let err = runner
            .run(&sh("echo starting; sleep 30"), Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(err.is_stall(), "expected stall, got {err:?}");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn progress_lines_keep_process_alive() {
        let runner = ProcessRunner::default();
        let script = "for i in 1 2 3 4 5; do echo \"[download]  ${i}0.0% of 1.00MiB\"; sleep 0.2; done";
        let result = runner.run(&sh(script), Duration::from_millis(700)).await;
        assert!(result.is_ok(), "progress should reset the idle timer: {result:?}");
    }

    #[tokio::test]
    async fn missing_binary_is_tool_missing() {
        let runner = ProcessRunner::default();
        let command = MediaCommand::new("/nonexistent/definitely-not-a-tool", "missing");
        let err = runner.run(&command, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CutterError::ToolMissing(_)));
    }

    #[test]
    fn tail_keeps_last_characters() {
        assert_eq!(tail_chars("abcdef", 3), "...def");
        assert_eq!(tail_chars("abc", 3), "abc");
    }
}
