//! Error types for execguard-core.
//!
//! These describe failures of the guard itself. Failures of the untrusted
//! code are never errors here; they are reported as an [`Outcome`](crate::Outcome).

use thiserror::Error;

/// Result type alias for execguard-core operations.
pub type Result<T> = std::result::Result<T, GuardError>;

/// Errors that prevent the guard from running or supervising the code.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Configuration rejected by validation
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// The submitted source could not be written to its staging file
    #[error("failed to stage source: {0}")]
    Stage(#[source] std::io::Error),

    /// The interpreter process could not be started
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Interpreter that was being launched
        program: String,
        /// Underlying spawn error
        #[source]
        source: std::io::Error,
    },

    /// I/O error while supervising the child
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
