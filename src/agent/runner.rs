//! Claude CLI subprocess runner.
//!
//! Each attempt spawns `<claude_cmd> --print ...`, writes the prompt to
//! stdin and closes it, then waits for exit under a deadline. On timeout
//! the child gets SIGTERM (then SIGKILL after a grace period) and the
//! attempt fails with a retryable [`AgentError::Timeout`].

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::time::Instant;

use super::retry::with_retry;
use super::stream::{LineBuffer, StreamDemux};
use super::{AgentRunResult, StepSink};
use crate::config::AgentSettings;
use crate::errors::AgentError;

/// How long a child gets to exit after SIGTERM before it is killed.
const KILL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ClaudeRunner {
    settings: AgentSettings,
    timeout_override: Option<Duration>,
}

impl ClaudeRunner {
    pub fn new(settings: AgentSettings) -> Self {
        Self {
            settings,
            timeout_override: None,
        }
    }

    /// Use `timeout` for both modes instead of the configured values.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    fn timeout(&self, streaming: bool) -> Duration {
        self.timeout_override
            .unwrap_or_else(|| self.settings.timeout(streaming))
    }

    /// Run `prompt` to completion and return the CLI's plain-text output.
    pub async fn run_prompt(&self, prompt: &str) -> AgentRunResult {
        let result = with_retry(&self.settings.retry, |attempt| {
            tracing::debug!(attempt, "running Claude CLI");
            self.attempt_plain(prompt)
        })
        .await;
        match result {
            Ok(output) => AgentRunResult {
                success: true,
                output,
                exit_code: Some(0),
                error: None,
            },
            Err(e) => failure(e),
        }
    }

    /// Run `prompt` in stream-json mode, handing each step to `sink` as it
    /// is decoded. Every attempt ends with a `complete` step.
    pub async fn run_prompt_streaming(&self, prompt: &str, sink: StepSink) -> AgentRunResult {
        let result = with_retry(&self.settings.retry, |attempt| {
            tracing::debug!(attempt, "running Claude CLI (streaming)");
            self.attempt_streaming(prompt, sink.clone())
        })
        .await;
        result.unwrap_or_else(failure)
    }

    fn command(&self, streaming: bool) -> Command {
        let mut cmd = Command::new(&self.settings.claude_cmd);
        cmd.args(self.settings.claude_flags(streaming));
        if let Some(dir) = &self.settings.working_dir {
            cmd.current_dir(dir);
        }
        if let Some(key) = &self.settings.anthropic_api_key {
            cmd.env("ANTHROPIC_API_KEY", key);
        }
        if let Some(token) = &self.settings.oauth_token {
            cmd.env("CLAUDE_CODE_OAUTH_TOKEN", token);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn spawn(&self, streaming: bool, prompt: &str) -> Result<Child, AgentError> {
        let mut child = self
            .command(streaming)
            .spawn()
            .map_err(|source| AgentError::Spawn {
                cmd: self.settings.claude_cmd.clone(),
                source,
            })?;
        tracing::debug!(pid = child.id(), streaming, "Claude CLI spawned");

        if let Some(mut stdin) = child.stdin.take() {
            let written = async {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await
            }
            .await;
            // A child that exits without reading stdin reports through its status.
            if let Err(e) = written
                && e.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(AgentError::Io(e));
            }
        }
        Ok(child)
    }

    async fn attempt_plain(&self, prompt: &str) -> Result<String, AgentError> {
        let timeout = self.timeout(false);
        let mut child = self.spawn(false, prompt).await?;
        let stdout = read_to_string_task(child.stdout.take());
        let stderr = read_to_string_task(child.stderr.take());

        let status = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => status.map_err(AgentError::Io)?,
            Err(_) => {
                terminate(&mut child).await;
                return Err(AgentError::Timeout {
                    secs: timeout.as_secs(),
                });
            }
        };

        let stdout = stdout.await.unwrap_or_default();
        let stderr = stderr.await.unwrap_or_default();
        match status.code() {
            Some(0) => Ok(stdout.trim().to_string()),
            code => Err(AgentError::NonZeroExit {
                code: code.unwrap_or(-1),
                message: error_message(&stderr, &stdout),
            }),
        }
    }

    async fn attempt_streaming(
        &self,
        prompt: &str,
        sink: StepSink,
    ) -> Result<AgentRunResult, AgentError> {
        let timeout = self.timeout(true);
        let deadline = Instant::now() + timeout;
        let mut child = self.spawn(true, prompt).await?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Io(std::io::Error::other("stdout not captured")))?;
        let stderr = read_to_string_task(child.stderr.take());

        let mut demux = StreamDemux::new();
        let mut lines = LineBuffer::new();
        let mut chunk = vec![0u8; 8 * 1024];
        let mut timed_out = false;

        loop {
            tokio::select! {
                read = stdout.read(&mut chunk) => {
                    match read {
                        Ok(0) => break,
                        Ok(n) => {
                            for line in lines.push(&chunk[..n]) {
                                if let Some(step) = demux.process_line(&line) {
                                    sink(step);
                                }
                            }
                        }
                        Err(e) => {
                            terminate(&mut child).await;
                            return Err(AgentError::Io(e));
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    timed_out = true;
                    break;
                }
            }
        }

        let status = if timed_out {
            None
        } else {
            if let Some(rest) = lines.finish()
                && let Some(step) = demux.process_line(&rest)
            {
                sink(step);
            }
            match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(status) => Some(status.map_err(AgentError::Io)?),
                Err(_) => None,
            }
        };

        let Some(status) = status else {
            terminate(&mut child).await;
            tracing::warn!(timeout_secs = timeout.as_secs(), "Claude CLI timed out");
            sink(demux.error_step(format!(
                "Claude CLI timed out after {}s",
                timeout.as_secs()
            )));
            sink(demux.complete(None));
            return Err(AgentError::Timeout {
                secs: timeout.as_secs(),
            });
        };

        let exit_code = status.code();
        sink(demux.complete(exit_code));

        match exit_code {
            Some(0) => Ok(AgentRunResult {
                success: true,
                output: demux.output(),
                exit_code,
                error: demux.error().map(str::to_string),
            }),
            code => {
                let stderr = stderr.await.unwrap_or_default();
                let message = match demux.error() {
                    Some(e) => e.to_string(),
                    None => error_message(&stderr, &demux.output()),
                };
                tracing::warn!(exit_code = code, error = %message, "Claude CLI failed");
                Err(AgentError::NonZeroExit {
                    code: code.unwrap_or(-1),
                    message,
                })
            }
        }
    }
}

fn failure(e: AgentError) -> AgentRunResult {
    AgentRunResult {
        success: false,
        output: String::new(),
        exit_code: e.exit_code(),
        error: Some(e.to_string()),
    }
}

fn error_message(stderr: &str, stdout: &str) -> String {
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = stdout.trim();
    if stdout.is_empty() {
        "no output".to_string()
    } else {
        stdout.to_string()
    }
}

/// Drain a pipe in the background so the child never blocks on a full buffer.
fn read_to_string_task<R>(pipe: Option<R>) -> tokio::task::JoinHandle<String>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut out = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut out).await;
        }
        String::from_utf8_lossy(&out).into_owned()
    })
}

/// SIGTERM, then SIGKILL if the child is still alive after [`KILL_GRACE`].
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            tracing::debug!(pid, error = %e, "SIGTERM failed");
        }
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_ok() {
            return;
        }
    }
    let _ = child.start_kill();
    let _ = child.wait().await;
}
