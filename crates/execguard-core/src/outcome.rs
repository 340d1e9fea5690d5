//! Outcome classification.
//!
//! Every way the child can end is mapped to exactly one [`Outcome`] by the
//! pure function [`Outcome::classify`].

use crate::limits::ResourceLimits;
use nix::sys::signal::Signal;
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::Duration;

/// Diagnostic for the wall-clock deadline.
pub const TIME_LIMIT_EXCEEDED: &str = "Time Limit Exceeded";

/// Diagnostic for the CPU-time ceiling.
pub const CPU_TIME_LIMIT_EXCEEDED: &str = "CPU Time Limit Exceeded";

/// Prefix of every runtime error diagnostic.
pub const RUNTIME_ERROR_PREFIX: &str = "Runtime Error: ";

/// How the child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited on its own with a status code.
    Exited(i32),
    /// Killed by a signal the guard did not send.
    Signaled(i32),
    /// Killed by the guard when the deadline fired.
    DeadlineKill,
}

impl From<ExitStatus> for Termination {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => Self::Exited(code),
            (None, Some(sig)) => Self::Signaled(sig),
            // Stopped/continued statuses never reach us from wait().
            (None, None) => Self::Exited(-1),
        }
    }
}

/// Final result of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Ran to completion with status 0.
    Success,
    /// Killed at the wall-clock deadline.
    TimeLimitExceeded,
    /// Killed by the kernel for exceeding the CPU-time ceiling.
    CpuTimeLimitExceeded,
    /// Any other failure, with a human-readable description.
    RuntimeError(String),
}

impl Outcome {
    /// Map the evidence from one run to an outcome.
    ///
    /// `cpu_used` is only consulted to attribute a `SIGKILL` the guard did
    /// not send: at or past the CPU ceiling it is the hard rlimit, otherwise
    /// it is reported as a runtime error.
    pub fn classify(
        termination: Termination,
        cpu_used: Duration,
        limits: &ResourceLimits,
        stderr: &[u8],
    ) -> Self {
        match termination {
            Termination::DeadlineKill => Self::TimeLimitExceeded,
            Termination::Exited(0) => Self::Success,
            Termination::Exited(code) => Self::RuntimeError(
                last_line(stderr).unwrap_or_else(|| format!("process exited with status {code}")),
            ),
            Termination::Signaled(sig) => match Signal::try_from(sig) {
                Ok(Signal::SIGXCPU) => Self::CpuTimeLimitExceeded,
                Ok(Signal::SIGKILL) if limits.cpu_exhausted(cpu_used) => {
                    Self::CpuTimeLimitExceeded
                }
                Ok(signal) => Self::RuntimeError(format!("terminated by signal {signal}")),
                Err(_) => Self::RuntimeError(format!("terminated by signal {sig}")),
            },
        }
    }

    /// Whether this is a successful run.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Process exit status reported to the caller.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::TimeLimitExceeded | Self::CpuTimeLimitExceeded | Self::RuntimeError(_) => 1,
        }
    }

    /// The single diagnostic line for the error stream, if any.
    pub fn diagnostic(&self) -> Option<String> {
        match self {
            Self::Success => None,
            Self::TimeLimitExceeded => Some(TIME_LIMIT_EXCEEDED.to_string()),
            Self::CpuTimeLimitExceeded => Some(CPU_TIME_LIMIT_EXCEEDED.to_string()),
            Self::RuntimeError(description) => Some(format!("{RUNTIME_ERROR_PREFIX}{description}")),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::TimeLimitExceeded => write!(f, "time limit exceeded"),
            Self::CpuTimeLimitExceeded => write!(f, "cpu time limit exceeded"),
            Self::RuntimeError(_) => write!(f, "runtime error"),
        }
    }
}

/// Last non-blank line of `stderr`, trimmed.
fn last_line(stderr: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: ResourceLimits = ResourceLimits {
        address_space_bytes: 128 * 1024 * 1024,
        cpu_seconds: 5,
    };

    fn classify(termination: Termination, stderr: &str) -> Outcome {
        Outcome::classify(termination, Duration::from_millis(10), &LIMITS, stderr.as_bytes())
    }

    #[test]
    fn test_termination_from_exit_status() {
        assert_eq!(Termination::from(ExitStatus::from_raw(0)), Termination::Exited(0));
        assert_eq!(Termination::from(ExitStatus::from_raw(3 << 8)), Termination::Exited(3));
        assert_eq!(Termination::from(ExitStatus::from_raw(9)), Termination::Signaled(9));
    }

    #[test]
    fn test_success() {
        let outcome = classify(Termination::Exited(0), "warning: something\n");
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(outcome.exit_code(), 0);
        assert!(outcome.diagnostic().is_none());
    }

    #[test]
    fn test_deadline_kill_wins() {
        let outcome = classify(Termination::DeadlineKill, "partial\n");
        assert_eq!(outcome, Outcome::TimeLimitExceeded);
        assert_eq!(outcome.diagnostic().as_deref(), Some("Time Limit Exceeded"));
        assert_ne!(outcome.exit_code(), 0);
    }

    #[test]
    fn test_runtime_error_uses_last_stderr_line() {
        let stderr = "Traceback (most recent call last):\n  File \"x\", line 1, in <module>\nZeroDivisionError: division by zero\n\n";
        let outcome = classify(Termination::Exited(1), stderr);
        assert_eq!(
            outcome,
            Outcome::RuntimeError("ZeroDivisionError: division by zero".into())
        );
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(
            outcome.diagnostic().as_deref(),
            Some("Runtime Error: ZeroDivisionError: division by zero")
        );
    }

    #[test]
    fn test_runtime_error_without_stderr() {
        let outcome = classify(Termination::Exited(7), "  \n");
        assert_eq!(
            outcome,
            Outcome::RuntimeError("process exited with status 7".into())
        );
    }

    #[test]
    fn test_sigxcpu_is_cpu_limit() {
        let outcome = classify(Termination::Signaled(raw(Signal::SIGXCPU)), "");
        assert_eq!(outcome, Outcome::CpuTimeLimitExceeded);
        assert_eq!(outcome.diagnostic().as_deref(), Some("CPU Time Limit Exceeded"));
        assert_eq!(outcome.exit_code(), 1);
    }

    #[test]
    fn test_sigkill_attribution_depends_on_cpu_used() {
        let kill = Termination::Signaled(raw(Signal::SIGKILL));
        let exhausted = Outcome::classify(kill, Duration::from_secs(6), &LIMITS, b"");
        assert_eq!(exhausted, Outcome::CpuTimeLimitExceeded);

        let external = Outcome::classify(kill, Duration::from_secs(1), &LIMITS, b"");
        assert_eq!(
            external,
            Outcome::RuntimeError("terminated by signal SIGKILL".into())
        );
    }

    #[test]
    fn test_other_signal_is_runtime_error() {
        let outcome = classify(Termination::Signaled(raw(Signal::SIGSEGV)), "");
        assert_eq!(
            outcome,
            Outcome::RuntimeError("terminated by signal SIGSEGV".into())
        );
        assert!(outcome
            .diagnostic()
            .is_some_and(|d| d.starts_with(RUNTIME_ERROR_PREFIX)));
    }

    fn raw(signal: Signal) -> i32 {
        signal as i32
    }
}
