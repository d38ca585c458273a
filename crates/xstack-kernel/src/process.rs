//! Child process execution
//!
//! Children run in their own process group with a scrubbed environment.
//! stdout and stderr are pumped line by line into one channel, so the
//! captured output interleaves in arrival order. Timeouts and cancellation
//! share one drain: SIGTERM to the group, a bounded grace period, SIGKILL.

use crate::error::{KernelError, KernelResult};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Return code reported for a timed-out child
pub const TIMEOUT_RETURNCODE: i32 = 124;

/// Return code reported when the tool cannot be resolved
pub const TOOL_MISSING_RETURNCODE: i32 = 127;

/// Return code reported for a cancelled child
pub const CANCELLED_RETURNCODE: i32 = 130;

/// What to run
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    /// Resolved executable
    pub program: PathBuf,
    /// Arguments
    pub args: Vec<String>,
    /// Complete environment; nothing is inherited
    pub env: BTreeMap<String, String>,
    /// Working directory
    pub cwd: PathBuf,
    /// Soft timeout
    pub timeout: Duration,
    /// Time between SIGTERM and SIGKILL
    pub grace: Duration,
}

/// How the child stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Exited on its own (signal deaths map to `128 + signo`)
    Exited(i32),
    /// Killed after the soft timeout
    TimedOut,
    /// Killed because the run was cancelled
    Cancelled,
}

/// Captured result of one child run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Stop reason
    pub exit: ExitKind,
    /// Merged stdout/stderr lines, lossily decoded
    pub lines: Vec<String>,
    /// Wall time
    pub elapsed: Duration,
}

impl ProcessOutput {
    /// Numeric return code
    #[must_use]
    pub fn returncode(&self) -> i32 {
        match self.exit {
            ExitKind::Exited(code) => code,
            ExitKind::TimedOut => TIMEOUT_RETURNCODE,
            ExitKind::Cancelled => CANCELLED_RETURNCODE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

/// Send `signal` to the process group led by `pid`, then to `pid` itself
#[cfg(unix)]
#[allow(unsafe_code)]
fn signal_group(pid: u32, signal: Signal) {
    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    let signo = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // SAFETY: kill(2) takes plain integers and touches no memory
    unsafe {
        let _ = libc::kill(-pid, signo);
        let _ = libc::kill(pid, signo);
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: Signal) {}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    1
}

async fn pump<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']);
                if tx.send(line.to_owned()).is_err() {
                    break;
                }
            }
        }
    }
}

async fn terminate(child: &mut Child, pid: Option<u32>, grace: Duration) {
    if let Some(pid) = pid {
        signal_group(pid, Signal::Term);
    }
    if tokio::time::timeout(grace, child.wait()).await.is_ok() {
        return;
    }
    tracing::debug!(?pid, "child ignored SIGTERM, killing");
    if let Some(pid) = pid {
        signal_group(pid, Signal::Kill);
    }
    let _ = child.kill().await;
}

enum Stop {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Run `spec` to completion, timeout or cancellation
///
/// # Errors
/// The child could not be spawned or waited on
pub async fn run_process(spec: &ProcessSpec, cancel: &CancellationToken) -> KernelResult<ProcessOutput> {
    let started = Instant::now();
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .env_clear()
        .envs(&spec.env)
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|source| KernelError::Spawn {
        program: spec.program.clone(),
        source,
    })?;
    let pid = child.id();
    tracing::debug!(program = %spec.program.display(), ?pid, "child spawned");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut pumps = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        pumps.push(tokio::spawn(pump(stdout, tx.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        pumps.push(tokio::spawn(pump(stderr, tx.clone())));
    }
    drop(tx);

    let stop = tokio::select! {
        status = child.wait() => Stop::Exited(status),
        () = tokio::time::sleep(spec.timeout) => Stop::TimedOut,
        () = cancel.cancelled() => Stop::Cancelled,
    };
    let exit = match stop {
        Stop::Exited(status) => {
            let status = status.map_err(|e| KernelError::io_error(&spec.program, e))?;
            ExitKind::Exited(exit_code(status))
        }
        Stop::TimedOut => {
            terminate(&mut child, pid, spec.grace).await;
            ExitKind::TimedOut
        }
        Stop::Cancelled => {
            terminate(&mut child, pid, spec.grace).await;
            ExitKind::Cancelled
        }
    };

    // Orphaned grandchildren may keep the pipes open; stop reading after the grace period.
    let mut lines = Vec::new();
    let drain = spec.grace.max(Duration::from_millis(200));
    while let Ok(Some(line)) = tokio::time::timeout(drain, rx.recv()).await {
        lines.push(line);
    }
    for handle in pumps {
        handle.abort();
    }

    Ok(ProcessOutput {
        exit,
        lines,
        elapsed: started.elapsed(),
    })
}
