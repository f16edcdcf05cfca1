//! ICMP probe backed by the system `ping` tool.
//!
//! One call spawns one child process that sends a single echo request. The
//! tool's own wait flag bounds the normal case; a supervisory deadline of
//! `timeout + 1s` on the process exit bounds everything else, after which the
//! child is killed and reaped before returning. Output is read by separate
//! tasks, so a descendant holding the pipes open cannot delay classification.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::{ProbeConfig, ProbeOutcome, Prober, parse_latency};
use crate::config::ConfigError;

/// Grace added on top of the probe timeout before the child is killed.
pub const SUPERVISORY_GRACE: Duration = Duration::from_secs(1);

/// How long output pipes may stay open after the tool has exited.
pub const PIPE_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Exit status `ping` uses for "no route / host unreachable" on BSD and macOS.
pub const DEFAULT_UNREACHABLE_EXIT_CODE: i32 = 2;

fn default_program() -> String {
    "ping".to_string()
}

fn default_unreachable_exit_code() -> i32 {
    DEFAULT_UNREACHABLE_EXIT_CODE
}

/// Unit expected by the tool's `-W` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitUnit {
    /// Milliseconds (macOS `ping`).
    Millis,
    /// Whole seconds (Linux iputils `ping`).
    Seconds,
}

impl Default for WaitUnit {
    fn default() -> Self {
        if cfg!(target_os = "macos") {
            Self::Millis
        } else {
            Self::Seconds
        }
    }
}

impl WaitUnit {
    /// Render `timeout` as the `-W` argument. Seconds round up, minimum 1.
    pub fn format(self, timeout: Duration) -> String {
        match self {
            Self::Millis => timeout.as_millis().max(1).to_string(),
            Self::Seconds => {
                let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
                secs.max(1).to_string()
            }
        }
    }
}

/// How to invoke the probe tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingToolConfig {
    /// Executable name or path (default: "ping").
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments placed before the count and wait flags.
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Unit of the `-W` flag (default: milliseconds on macOS, seconds elsewhere).
    #[serde(default)]
    pub wait_unit: WaitUnit,
    /// Exit status reported as `Unreachable` (default: 2).
    #[serde(default = "default_unreachable_exit_code")]
    pub unreachable_exit_code: i32,
}

impl Default for PingToolConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            extra_args: Vec::new(),
            wait_unit: WaitUnit::default(),
            unreachable_exit_code: DEFAULT_UNREACHABLE_EXIT_CODE,
        }
    }
}

impl PingToolConfig {
    /// Create a tool configuration for `program` with platform defaults.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.program.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "ping program must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Set arguments placed before the probe arguments.
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the unit of the wait flag.
    pub fn with_wait_unit(mut self, unit: WaitUnit) -> Self {
        self.wait_unit = unit;
        self
    }

    /// Set the exit status treated as unreachable.
    pub fn with_unreachable_exit_code(mut self, code: i32) -> Self {
        self.unreachable_exit_code = code;
        self
    }

    /// Full argument list for one probe: extra args, `-c 1 -W <wait>`, target last.
    pub fn args(&self, config: &ProbeConfig) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.extend([
            "-c".to_string(),
            "1".to_string(),
            "-W".to_string(),
            self.wait_unit.format(config.timeout),
            config.target.to_string(),
        ]);
        args
    }
}

/// Prober that shells out to the system `ping`.
#[derive(Debug, Clone, Default)]
pub struct PingProber {
    tool: PingToolConfig,
}

impl PingProber {
    /// Create a prober with the given tool configuration.
    pub fn new(tool: PingToolConfig) -> Self {
        Self { tool }
    }

    /// Tool settings this prober was built with.
    pub fn tool(&self) -> &PingToolConfig {
        &self.tool
    }

    fn command(&self, config: &ProbeConfig) -> Command {
        let mut cmd = Command::new(&self.tool.program);
        cmd.args(self.tool.args(config))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Map a finished process to an outcome.
    fn classify(&self, status: ExitStatus, stdout: &str, stderr: &str) -> ProbeOutcome {
        match status.code() {
            Some(0) => parse_latency(stdout),
            Some(code) if code == self.tool.unreachable_exit_code => ProbeOutcome::Unreachable,
            Some(code) => {
                let stderr = stderr.trim();
                if stderr.is_empty() {
                    ProbeOutcome::failed(format!("exit code {code}"))
                } else {
                    ProbeOutcome::failed(stderr)
                }
            }
            None => ProbeOutcome::failed("terminated by signal"),
        }
    }
}

/// Output of one child pipe, collected by a background reader task.
struct PipeCapture {
    buf: Arc<Mutex<Vec<u8>>>,
    reader: JoinHandle<()>,
}

impl PipeCapture {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let reader = tokio::spawn(async move {
            let Some(mut pipe) = pipe else {
                return;
            };
            let mut chunk = [0u8; 1024];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        tracing::debug!(error = %e, "Failed to read probe output");
                        break;
                    }
                }
            }
        });
        Self { buf, reader }
    }

    /// Wait up to `grace` for end of file, then return what was read, lossily decoded.
    async fn finish(mut self, grace: Duration) -> String {
        if timeout(grace, &mut self.reader).await.is_err() {
            tracing::debug!("Probe output still open after exit, using partial output");
        }
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Drop for PipeCapture {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Kill the child and reap it so no process outlives the probe.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(error = %e, "Failed to kill probe process");
    }
    if let Err(e) = child.wait().await {
        tracing::warn!(error = %e, "Failed to reap probe process");
    }
}

#[async_trait::async_trait]
impl Prober for PingProber {
    async fn probe(&self, config: &ProbeConfig) -> ProbeOutcome {
        let mut child = match self.command(config).spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(
                    program = %self.tool.program,
                    host = %config.target,
                    error = %e,
                    "Failed to launch probe"
                );
                return ProbeOutcome::failed(e.to_string());
            }
        };

        let stdout = PipeCapture::spawn(child.stdout.take());
        let stderr = PipeCapture::spawn(child.stderr.take());
        let deadline = config.timeout + SUPERVISORY_GRACE;

        let exited = timeout(deadline, child.wait()).await;
        let outcome = match exited {
            Ok(Ok(status)) => {
                let (stdout, stderr) = tokio::join!(
                    stdout.finish(PIPE_DRAIN_GRACE),
                    stderr.finish(PIPE_DRAIN_GRACE)
                );
                self.classify(status, &stdout, &stderr)
            }
            Ok(Err(e)) => ProbeOutcome::failed(format!("failed to wait for probe: {e}")),
            Err(_) => {
                tracing::warn!(
                    host = %config.target,
                    deadline_ms = deadline.as_millis(),
                    "Probe exceeded supervisory deadline"
                );
                terminate(&mut child).await;
                ProbeOutcome::Timeout
            }
        };

        match &outcome {
            ProbeOutcome::Success { latency_ms } => {
                tracing::debug!(host = %config.target, latency_ms, "Probe successful");
            }
            other => {
                tracing::warn!(host = %config.target, outcome = %other, "Probe did not succeed");
            }
        }
        outcome
    }
}
