//! # execguard-core
//!
//! Runs one untrusted code submission under hard resource ceilings and
//! reports a deterministic outcome.
//!
//! The submitted source is handed to an interpreter (`python3` by default)
//! running as a separate process. Before that process executes anything the
//! guard installs an address-space ceiling and a CPU-time ceiling on it;
//! while it runs, a wall-clock deadline in the guard kills its whole process
//! group if exceeded.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────── execguard (guard process) ──┐
//! │                                                            │
//! │  GuardConfig ──▶ ExecutionGuard::run(request, sink)        │
//! │                      │                                     │
//! │                      │ spawn (pre_exec: setrlimit AS/CPU)  │
//! │                      ▼                                     │
//! │   stdin pipe ──▶ ┌──────────────────┐ ──▶ stdout ──▶ sink  │
//! │   (input, EOF)   │ interpreter      │ ──▶ stderr (tail)    │
//! │                  │ <staged source>  │                      │
//! │   deadline ────▶ └──────────────────┘ ◀── SIGKILL (group)  │
//! │                      │ wait status                         │
//! │                      ▼                                     │
//! │               Outcome::classify ──▶ ExecutionReport        │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use execguard_core::{ExecutionGuard, ExecutionRequest, GuardConfig, Outcome};
//!
//! # async fn example() -> execguard_core::Result<()> {
//! let guard = ExecutionGuard::new(GuardConfig::default())?;
//! let request = ExecutionRequest::new("print(input())", "hello\n");
//!
//! let mut stdout = Vec::new();
//! let report = guard.run(&request, &mut stdout).await?;
//!
//! assert_eq!(report.outcome, Outcome::Success);
//! assert_eq!(stdout, b"hello\n");
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod guard;
mod limits;
mod outcome;
mod request;

pub use config::{
    GuardConfig, GuardConfigBuilder, DEFAULT_CPU_SECS, DEFAULT_INTERPRETER, DEFAULT_MAX_STDERR_BYTES,
    DEFAULT_MEMORY_MIB, DEFAULT_TIMEOUT_SECS,
};
pub use error::{GuardError, Result};
pub use guard::{ExecutionGuard, ExecutionReport, ENV_PASSTHROUGH};
pub use limits::{children_cpu_time, ResourceLimits, CPU_HARD_GRACE_SECS};
pub use outcome::{
    Outcome, Termination, CPU_TIME_LIMIT_EXCEEDED, RUNTIME_ERROR_PREFIX, TIME_LIMIT_EXCEEDED,
};
pub use request::{ExecutionRequest, CODE_VAR, INPUT_VAR};
