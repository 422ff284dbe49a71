use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tracing::trace;

/// One run of an external program.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Execution id, used for log correlation.
    pub id: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Bytes fed to standard input. `None` attaches `/dev/null`.
    pub stdin: Option<Vec<u8>>,
    pub timeout: Duration,
    /// Per-stream capture limit in bytes; the rest is discarded.
    pub max_output: usize,
}

impl Invocation {
    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.display().to_string());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// How a program run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Killed after exceeding its deadline.
    TimedOut,
    /// Exited unsuccessfully; carries the exit status description.
    NonZeroExit(String),
    /// Could not be run at all.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramOutput {
    pub stdout: String,
    pub stderr: String,
    pub outcome: Outcome,
}

impl ProgramOutput {
    pub fn success(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            outcome: Outcome::Success,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            outcome: Outcome::Failed(message.into()),
        }
    }

    pub fn timed_out() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            outcome: Outcome::TimedOut,
        }
    }
}

/// Runs external programs under a deadline with bounded output capture.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn run(&self, invocation: Invocation) -> ProgramOutput;
}

/// [`Invoker`] backed by child processes of the current one.
///
/// Each program runs in its own process group so that a timeout kills
/// everything it started, not only the direct child.
#[derive(Debug, Clone, Copy, Default)]
pub struct Program;

#[async_trait]
impl Invoker for Program {
    async fn run(&self, invocation: Invocation) -> ProgramOutput {
        trace!(id = %invocation.id, command = %invocation.display(), "run");

        let stdin = if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        };
        let spawned = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                return ProgramOutput::failed(format!(
                    "spawn {}: {e}",
                    invocation.program.display()
                ));
            }
        };

        let input = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let limit = invocation.max_output;

        let finished = tokio::time::timeout(invocation.timeout, async {
            let (status, (), stdout, stderr) = tokio::join!(
                child.wait(),
                write_input(input, invocation.stdin),
                read_limited(stdout, limit),
                read_limited(stderr, limit),
            );
            (status, stdout, stderr)
        })
        .await;

        let Ok((status, stdout, stderr)) = finished else {
            kill_process_group(&child);
            let _ = child.kill().await;
            trace!(id = %invocation.id, timeout = ?invocation.timeout, "killed after timeout");
            return ProgramOutput::timed_out();
        };

        let outcome = match status {
            Ok(status) if status.success() => Outcome::Success,
            Ok(status) => Outcome::NonZeroExit(status.to_string()),
            Err(e) => Outcome::Failed(format!("wait {}: {e}", invocation.program.display())),
        };
        ProgramOutput {
            stdout,
            stderr,
            outcome,
        }
    }
}

/// Kill the process group led by `child`.
///
/// The child must have been spawned with `process_group(0)`. No-op if it has
/// already been reaped.
fn kill_process_group(child: &Child) {
    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    let group = nix::unistd::Pid::from_raw(pid);
    let _ = nix::sys::signal::killpg(group, nix::sys::signal::Signal::SIGKILL);
}

/// Write `data` to the child's stdin, then close it.
async fn write_input(pipe: Option<ChildStdin>, data: Option<Vec<u8>>) {
    let (Some(mut pipe), Some(data)) = (pipe, data) else {
        return;
    };
    // The program may exit without consuming its input.
    if let Err(e) = pipe.write_all(&data).await {
        trace!(error = %e, "stdin write interrupted");
    }
}

/// Read a stream to its end, keeping at most `limit` bytes.
async fn read_limited<R: AsyncRead + Unpin>(stream: Option<R>, limit: usize) -> String {
    let Some(mut stream) = stream else {
        return String::new();
    };
    let mut buf = Vec::new();
    let cap = u64::try_from(limit).unwrap_or(u64::MAX);
    if let Err(e) = (&mut stream).take(cap).read_to_end(&mut buf).await {
        trace!(error = %e, "output read interrupted");
    }
    // Keep draining so the program never blocks on a full pipe.
    let _ = tokio::io::copy(&mut stream, &mut tokio::io::sink()).await;
    String::from_utf8_lossy(&buf).into_owned()
}
