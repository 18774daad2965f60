//! Subprocess execution behind the [`CommandRunner`] seam.
//!
//! [`ProcessRunner`] spawns the real executable with stdout and stderr
//! sharing a single pipe, so the captured bytes keep the order in which
//! the tool wrote them. The child leads its own process group. When the
//! caller stops polling the returned future (cancellation, deadline, or a
//! client that hung up) the whole group is killed, so processes forked by a
//! wrapper script cannot outlive the call or hold the output pipe open.

use std::io::Read;
use std::process::Stdio;

use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tracing::{debug, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::BoxFuture;

/// Program and argument vector for one subprocess invocation.
///
/// Arguments are handed to the OS as discrete argv entries. No shell is
/// involved, so caller-supplied values cannot inject extra arguments.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    /// Human-readable command line with secrets masked.
    command_line: String,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>, command_line: String) -> Self {
        Self {
            program: program.into(),
            args,
            command_line,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Command line safe to log and to return to callers.
    ///
    /// The password in the target URL is shown as `***`, so callers that
    /// receive this in a soft error see `login%***@portal`, never the real
    /// secret. The real URL exists only in [`Invocation::args`].
    pub fn command_line(&self) -> &str {
        &self.command_line
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invocation")
            .field("command_line", &self.command_line)
            .finish()
    }
}

/// Errors from running a subprocess.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{0}")]
    Spawn(#[source] std::io::Error),

    #[error("{}", describe_exit(.code))]
    Exit { code: Option<i32>, output: Vec<u8> },

    #[error("wait failed: {0}")]
    Wait(#[source] std::io::Error),
}

impl RunError {
    /// Output captured before the failure, if the process got that far.
    pub fn output(&self) -> &[u8] {
        match self {
            RunError::Exit { output, .. } => output,
            RunError::Spawn(_) | RunError::Wait(_) => &[],
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("exit status {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Runs an [`Invocation`] to completion and returns its combined output.
///
/// Implementations must stop the underlying work when the returned future
/// is dropped.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<Vec<u8>, RunError>>;
}

/// Runs invocations as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run<'a>(&'a self, invocation: &'a Invocation) -> BoxFuture<'a, Result<Vec<u8>, RunError>> {
        Box::pin(async move {
            let (mut reader, writer) = std::io::pipe().map_err(RunError::Spawn)?;
            let stderr_writer = writer.try_clone().map_err(RunError::Spawn)?;

            let mut command = tokio::process::Command::new(invocation.program());
            command
                .args(invocation.args())
                .stdin(Stdio::null())
                .stdout(Stdio::from(writer))
                .stderr(Stdio::from(stderr_writer))
                .process_group(0)
                .kill_on_drop(true);

            let mut child = command.spawn().map_err(RunError::Spawn)?;
            let mut group = ProcessGroup::of(&child);
            // The command still owns the parent's write ends; the reader only
            // sees EOF once they are closed.
            drop(command);
            debug!(pid = child.id(), program = invocation.program(), "Spawned subprocess");

            let collect = tokio::task::spawn_blocking(move || {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).map(|_| buf)
            });

            let status = child.wait().await.map_err(RunError::Wait)?;
            // Stragglers left behind by the child would keep the pipe open.
            group.kill();
            let output = collect
                .await
                .map_err(|e| RunError::Wait(std::io::Error::other(e)))?
                .map_err(RunError::Wait)?;

            if status.success() {
                Ok(output)
            } else {
                Err(RunError::Exit {
                    code: status.code(),
                    output,
                })
            }
        })
    }
}

/// Kills a child's process group when dropped.
struct ProcessGroup(Option<Pid>);

impl ProcessGroup {
    fn of(child: &tokio::process::Child) -> Self {
        Self(
            child
                .id()
                .and_then(|id| i32::try_from(id).ok())
                .map(Pid::from_raw),
        )
    }

    fn kill(&mut self) {
        let Some(pgid) = self.0.take() else {
            return;
        };
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => warn!(pgid = pgid.as_raw(), error = %e, "Failed to kill process group"),
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}
