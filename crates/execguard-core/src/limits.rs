//! Kernel-enforced resource ceilings for the child process.
//!
//! ## Limits Applied
//!
//! | Limit | Soft | Hard |
//! |-------|------|------|
//! | `RLIMIT_AS` | memory ceiling | memory ceiling |
//! | `RLIMIT_CPU` | CPU ceiling | CPU ceiling + 1s |
//! | `RLIMIT_CORE` | 0 | 0 |
//!
//! The CPU hard limit sits one second above the soft limit so the kernel
//! delivers `SIGXCPU` first. `SIGKILL` at the hard limit only happens when the
//! child ignores `SIGXCPU`.

use nix::sys::resource::{getrusage, setrlimit, Resource, UsageWho};
use nix::sys::time::{TimeVal, TimeValLike};
use std::io;
use std::time::Duration;

/// Seconds between the soft and hard CPU limits.
pub const CPU_HARD_GRACE_SECS: u64 = 1;

/// Address-space and CPU-time ceilings for one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Maximum virtual memory the child may map, in bytes.
    pub address_space_bytes: u64,
    /// CPU seconds before the kernel sends `SIGXCPU`.
    pub cpu_seconds: u64,
}

impl ResourceLimits {
    /// Install the limits on the calling process.
    ///
    /// Meant to run in the child between `fork` and `exec`. It only issues
    /// `setrlimit` calls, so it is async-signal-safe.
    pub fn apply(&self) -> io::Result<()> {
        setrlimit(
            Resource::RLIMIT_AS,
            self.address_space_bytes,
            self.address_space_bytes,
        )?;
        setrlimit(
            Resource::RLIMIT_CPU,
            self.cpu_seconds,
            self.cpu_seconds.saturating_add(CPU_HARD_GRACE_SECS),
        )?;
        setrlimit(Resource::RLIMIT_CORE, 0, 0)?;
        Ok(())
    }

    /// Whether `used` CPU time reaches the soft ceiling.
    pub fn cpu_exhausted(&self, used: Duration) -> bool {
        used.as_secs() >= self.cpu_seconds
    }
}

/// CPU time (user + system) accumulated by all reaped children so far.
pub fn children_cpu_time() -> Duration {
    match getrusage(UsageWho::RUSAGE_CHILDREN) {
        Ok(usage) => {
            timeval_to_duration(usage.user_time()) + timeval_to_duration(usage.system_time())
        }
        Err(e) => {
            tracing::warn!(error = %e, "getrusage failed");
            Duration::ZERO
        }
    }
}

fn timeval_to_duration(tv: TimeVal) -> Duration {
    Duration::from_micros(tv.num_microseconds().max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::CommandExt;
    use std::process::Command;

    #[test]
    fn test_cpu_exhausted() {
        let limits = ResourceLimits {
            address_space_bytes: 1 << 30,
            cpu_seconds: 2,
        };
        assert!(!limits.cpu_exhausted(Duration::from_millis(1999)));
        assert!(limits.cpu_exhausted(Duration::from_secs(2)));
        assert!(limits.cpu_exhausted(Duration::from_millis(2500)));
    }

    #[test]
    fn test_apply_in_child() {
        let limits = ResourceLimits {
            address_space_bytes: 64 * 1024 * 1024,
            cpu_seconds: 2,
        };
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "ulimit -t; ulimit -v; ulimit -c"]);
        // SAFETY: apply() only calls setrlimit.
        unsafe {
            cmd.pre_exec(move || limits.apply());
        }
        let out = cmd.output().expect("sh should run");
        assert!(out.status.success());
        let stdout = String::from_utf8_lossy(&out.stdout);
        let lines: Vec<&str> = stdout.lines().collect();
        assert_eq!(lines, vec!["2", "65536", "0"]);
    }

    #[test]
    fn test_children_cpu_time_is_monotonic() {
        let before = children_cpu_time();
        let _ = Command::new("true").status();
        assert!(children_cpu_time() >= before);
    }
}
