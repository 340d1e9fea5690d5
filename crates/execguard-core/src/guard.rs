//! The execution guard.
//!
//! Runs one submission as a child process and supervises it:
//! 1. Stage the source into a private temp file
//! 2. Spawn the interpreter in its own process group, rlimits installed before exec
//! 3. Feed the input through a stdin pipe, then close it
//! 4. Stream stdout to the caller's sink, capture stderr
//! 5. Kill the whole group if the wall-clock deadline fires, and again once
//!    the child has exited so leftover descendants cannot hold the pipes
//! 6. Classify how the child ended

use crate::config::GuardConfig;
use crate::error::{GuardError, Result};
use crate::limits::{children_cpu_time, ResourceLimits};
use crate::outcome::{Outcome, Termination};
use crate::request::ExecutionRequest;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::io::{self, Write};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, trace, warn};

/// Variables copied from the guard's environment into the child's.
/// Everything else, including the request variables, is withheld.
pub const ENV_PASSTHROUGH: &[&str] = &["PATH", "HOME", "LANG", "TERM", "TZ"];

const READ_CHUNK: usize = 8 * 1024;

/// How long to keep draining stdout/stderr once the child is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// What the guard observed for one run.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    /// Classified result.
    pub outcome: Outcome,
    /// How the child ended.
    pub termination: Termination,
    /// Wall-clock time from spawn to reap.
    pub wall_time: Duration,
    /// CPU time charged to children during the run.
    pub cpu_time: Duration,
    /// Tail of the child's stderr.
    pub stderr: Vec<u8>,
}

impl ExecutionReport {
    /// Process exit status the caller should see.
    pub fn exit_code(&self) -> u8 {
        self.outcome.exit_code()
    }
}

/// Runs untrusted code under memory, CPU and wall-clock ceilings.
#[derive(Debug, Clone)]
pub struct ExecutionGuard {
    config: GuardConfig,
}

impl ExecutionGuard {
    /// Create a guard, validating the configuration.
    pub fn new(config: GuardConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The configuration in use.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Run `request` to completion or failure.
    ///
    /// The child's stdout is copied into `stdout` as it is produced. Failures
    /// of the submitted code are reported through [`ExecutionReport::outcome`];
    /// `Err` means the guard itself could not stage, spawn or supervise it.
    pub async fn run<W>(&self, request: &ExecutionRequest, stdout: &mut W) -> Result<ExecutionReport>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let script = stage_source(&request.code)?;
        let limits = self.config.limits();
        let program = self.config.interpreter.display().to_string();
        debug!(
            program = %program,
            code_len = request.code.len(),
            input_len = request.input.len(),
            memory_limit_bytes = limits.address_space_bytes,
            cpu_seconds = limits.cpu_seconds,
            wall_timeout = ?self.config.wall_timeout,
            "starting execution"
        );

        let cpu_before = children_cpu_time();
        let started = Instant::now();
        let mut child = self
            .command(script.path(), limits)
            .spawn()
            .map_err(|source| GuardError::Spawn {
                program: program.clone(),
                source,
            })?;
        let pid = child.id();
        debug!(pid = ?pid, "child spawned");

        let feeder = child
            .stdin
            .take()
            .map(|stdin| tokio::spawn(feed_stdin(stdin, request.input.clone().into_bytes())));
        let mut child_stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout was not piped"))?;
        let mut child_stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("child stderr was not piped"))?;

        let max_stderr = self.config.max_stderr_bytes;
        let mut stderr = Vec::new();
        let (termination, drained) = {
            let drain = async {
                let (copied, tail) = tokio::join!(
                    tokio::io::copy(&mut child_stdout, &mut *stdout),
                    read_tail(&mut child_stderr, max_stderr, &mut stderr),
                );
                tail?;
                copied
            };
            tokio::pin!(drain);
            let deadline = tokio::time::sleep(self.config.wall_timeout);
            tokio::pin!(deadline);

            // The deadline bounds the child only. Pipes may close before or
            // after it exits.
            let mut drained = None;
            let termination = loop {
                tokio::select! {
                    result = &mut drain, if drained.is_none() => drained = Some(result),
                    status = child.wait() => break Termination::from(status?),
                    () = &mut deadline => {
                        warn!(timeout = ?self.config.wall_timeout, pid = ?pid, "deadline fired, killing child");
                        kill_group(&mut child, pid).await?;
                        break Termination::DeadlineKill;
                    }
                }
            };

            // Leftover descendants may still hold the pipes open.
            signal_group(pid);
            let drained = match drained {
                Some(result) => Some(result),
                None => match tokio::time::timeout(DRAIN_GRACE, &mut drain).await {
                    Ok(result) => Some(result),
                    Err(_) => {
                        warn!(pid = ?pid, "output pipes still open after child exit, abandoning");
                        None
                    }
                },
            };
            (termination, drained)
        };
        if let Some(copied) = drained.transpose()? {
            trace!(stdout_bytes = copied, stderr_bytes = stderr.len(), "streams drained");
        }

        if let Some(feeder) = feeder {
            feeder.abort();
        }
        stdout.flush().await?;

        let wall_time = started.elapsed();
        let cpu_time = children_cpu_time().saturating_sub(cpu_before);
        let outcome = Outcome::classify(termination, cpu_time, &limits, &stderr);
        info!(
            outcome = %outcome,
            termination = ?termination,
            wall_time = ?wall_time,
            cpu_time = ?cpu_time,
            "execution finished"
        );

        drop(script);
        Ok(ExecutionReport {
            outcome,
            termination,
            wall_time,
            cpu_time,
            stderr,
        })
    }

    /// Build the child command: interpreter + staged file, scrubbed env,
    /// piped stdio, own process group, rlimits before exec.
    fn command(&self, script: &Path, limits: ResourceLimits) -> Command {
        let mut cmd = Command::new(&self.config.interpreter);
        cmd.arg(script).env_clear();
        for name in ENV_PASSTHROUGH {
            if let Some(value) = std::env::var_os(name) {
                cmd.env(name, value);
            }
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        // SAFETY: apply() only issues setrlimit calls, which are async-signal-safe.
        unsafe {
            cmd.pre_exec(move || limits.apply());
        }
        cmd
    }
}

/// Write the submitted source to a private temporary file.
fn stage_source(code: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("execguard-")
        .tempfile()
        .map_err(GuardError::Stage)?;
    file.write_all(code.as_bytes()).map_err(GuardError::Stage)?;
    file.flush().map_err(GuardError::Stage)?;
    trace!(path = %file.path().display(), "source staged");
    Ok(file)
}

/// Write the whole input, then close the pipe so the child sees EOF.
async fn feed_stdin(mut stdin: ChildStdin, input: Vec<u8>) {
    match stdin.write_all(&input).await {
        Ok(()) => trace!(bytes = input.len(), "input delivered"),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("child closed stdin before reading all input");
        }
        Err(e) => warn!(error = %e, "failed to write child stdin"),
    }
}

/// Read `reader` to EOF into `kept`, keeping only the last `max` bytes.
async fn read_tail<R>(reader: &mut R, max: usize, kept: &mut Vec<u8>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        kept.extend_from_slice(&chunk[..n]);
        // Compact lazily so a chatty child costs amortised O(1) per byte.
        if kept.len() > max.saturating_mul(2) {
            kept.drain(..kept.len() - max);
        }
    }
    if kept.len() > max {
        kept.drain(..kept.len() - max);
    }
    Ok(())
}

/// SIGKILL whatever is left in the child's process group.
fn signal_group(pid: Option<u32>) {
    if let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) {
        match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            Ok(()) => debug!(pid, "killed process group"),
            Err(e) => trace!(pid, error = %e, "process group already empty"),
        }
    }
}

/// SIGKILL the child's process group and reap the child.
async fn kill_group(child: &mut Child, pid: Option<u32>) -> io::Result<()> {
    signal_group(pid);
    if let Err(e) = child.start_kill() {
        trace!(error = %e, "start_kill after killpg");
    }
    let status = child.wait().await?;
    debug!(status = ?status, "child reaped after deadline");
    Ok(())
}
