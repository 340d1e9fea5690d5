//! execguard: run one untrusted submission and report its outcome.
//!
//! Reads `USER_CODE` and `INPUT_DATA` from the environment, runs the code
//! under the configured ceilings, and reports through the standard streams
//! and the exit status:
//!
//! | Result | stderr | exit |
//! |--------|--------|------|
//! | success | child's own stderr | 0 |
//! | wall-clock deadline | `Time Limit Exceeded` | 1 |
//! | CPU ceiling | `CPU Time Limit Exceeded` | 1 |
//! | any other failure | `Runtime Error: <description>` | 1 |
//! | guard could not run the code | `Internal Error: <description>` | 2 |
//!
//! stdout always carries exactly what the code printed.

use anyhow::Context;
use execguard_core::{ExecutionGuard, ExecutionReport, ExecutionRequest, GuardConfig};
use std::io::Write;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit status when the guard itself fails.
const INTERNAL_ERROR_EXIT: u8 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    let config = GuardConfig::from_env();
    tracing::debug!(?config, "configuration loaded");
    let request = ExecutionRequest::from_env();

    match execute(config, &request).await {
        Ok(report) => {
            let mut stderr = std::io::stderr().lock();
            let written = match report.outcome.diagnostic() {
                Some(diagnostic) => writeln!(stderr, "{diagnostic}"),
                None => stderr.write_all(&report.stderr),
            };
            if let Err(e) = written.and_then(|()| stderr.flush()) {
                tracing::warn!(error = %e, "failed to write stderr");
            }
            ExitCode::from(report.exit_code())
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "guard failed");
            eprintln!("Internal Error: {e:#}");
            ExitCode::from(INTERNAL_ERROR_EXIT)
        }
    }
}

/// Build the guard and run the request with our stdout as the sink.
async fn execute(config: GuardConfig, request: &ExecutionRequest) -> anyhow::Result<ExecutionReport> {
    let guard = ExecutionGuard::new(config).context("invalid configuration")?;
    let mut stdout = tokio::io::stdout();
    let report = guard
        .run(request, &mut stdout)
        .await
        .context("failed to run submission")?;
    Ok(report)
}

/// Logs share stderr with the diagnostic line, so they stay off unless
/// `RUST_LOG` is set.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("off"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
