//! Guard configuration.
//!
//! Configuration is loaded from environment variables with defaults matching
//! the reference deployment: 128 MiB address space, 5 s of CPU, 10 s of
//! wall-clock time.

use crate::error::GuardError;
use crate::limits::ResourceLimits;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default interpreter used to run submissions.
pub const DEFAULT_INTERPRETER: &str = "python3";

/// Default address-space ceiling in MiB.
pub const DEFAULT_MEMORY_MIB: u64 = 128;

/// Default CPU-time ceiling in seconds.
pub const DEFAULT_CPU_SECS: u64 = 5;

/// Default wall-clock deadline in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Maximum stderr retained for classification (1 MB).
pub const DEFAULT_MAX_STDERR_BYTES: usize = 1024 * 1024;

/// Configuration for an [`ExecutionGuard`](crate::ExecutionGuard).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Interpreter invoked with the staged source file as its only argument.
    pub interpreter: PathBuf,
    /// Address-space ceiling for the child, in bytes.
    pub memory_limit_bytes: u64,
    /// CPU-time ceiling for the child (whole seconds are enforced).
    pub cpu_time_limit: Duration,
    /// Wall-clock deadline after which the child is killed.
    pub wall_timeout: Duration,
    /// Bytes of child stderr kept; the rest is drained and dropped.
    pub max_stderr_bytes: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            interpreter: PathBuf::from(DEFAULT_INTERPRETER),
            memory_limit_bytes: DEFAULT_MEMORY_MIB * 1024 * 1024,
            cpu_time_limit: Duration::from_secs(DEFAULT_CPU_SECS),
            wall_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_stderr_bytes: DEFAULT_MAX_STDERR_BYTES,
        }
    }
}

impl GuardConfig {
    /// Create a new config builder.
    pub fn builder() -> GuardConfigBuilder {
        GuardConfigBuilder::default()
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `EXECGUARD_INTERPRETER` | `python3` |
    /// | `EXECGUARD_MEMORY_MIB` | `128` |
    /// | `EXECGUARD_CPU_SECS` | `5` |
    /// | `EXECGUARD_TIMEOUT_SECS` | `10` |
    /// | `EXECGUARD_MAX_STDERR_BYTES` | `1048576` |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        let memory_mib = parse_or(&lookup, "EXECGUARD_MEMORY_MIB", DEFAULT_MEMORY_MIB);
        let cpu_secs = parse_or(&lookup, "EXECGUARD_CPU_SECS", DEFAULT_CPU_SECS);
        let timeout_secs = parse_or(&lookup, "EXECGUARD_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS);

        Self {
            interpreter: lookup("EXECGUARD_INTERPRETER")
                .map(PathBuf::from)
                .unwrap_or(default.interpreter),
            memory_limit_bytes: memory_mib.saturating_mul(1024 * 1024),
            cpu_time_limit: Duration::from_secs(cpu_secs),
            wall_timeout: Duration::from_secs(timeout_secs),
            max_stderr_bytes: parse_or(
                &lookup,
                "EXECGUARD_MAX_STDERR_BYTES",
                default.max_stderr_bytes,
            ),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), GuardError> {
        if self.interpreter.as_os_str().is_empty() {
            return Err(GuardError::InvalidConfig("interpreter is required".into()));
        }
        if self.memory_limit_bytes == 0 {
            return Err(GuardError::InvalidConfig(
                "memory_limit_bytes must be > 0".into(),
            ));
        }
        if self.cpu_time_limit.as_secs() == 0 {
            return Err(GuardError::InvalidConfig(
                "cpu_time_limit must be at least 1s".into(),
            ));
        }
        if self.wall_timeout.is_zero() {
            return Err(GuardError::InvalidConfig("wall_timeout must be > 0".into()));
        }
        Ok(())
    }

    /// The rlimits installed in the child.
    pub fn limits(&self) -> ResourceLimits {
        ResourceLimits {
            address_space_bytes: self.memory_limit_bytes,
            cpu_seconds: self.cpu_time_limit.as_secs(),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "unparseable value, using default");
                default
            }
        },
        None => default,
    }
}

/// Builder for GuardConfig.
#[derive(Debug, Default)]
pub struct GuardConfigBuilder {
    config: GuardConfig,
}

impl GuardConfigBuilder {
    /// Set the interpreter.
    pub fn interpreter(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.interpreter = path.into();
        self
    }

    /// Set the address-space ceiling in MiB.
    pub fn memory_mib(mut self, mib: u64) -> Self {
        self.config.memory_limit_bytes = mib.saturating_mul(1024 * 1024);
        self
    }

    /// Set the CPU-time ceiling.
    pub fn cpu_time_limit(mut self, limit: Duration) -> Self {
        self.config.cpu_time_limit = limit;
        self
    }

    /// Set the wall-clock deadline.
    pub fn wall_timeout(mut self, timeout: Duration) -> Self {
        self.config.wall_timeout = timeout;
        self
    }

    /// Set how much child stderr is retained.
    pub fn max_stderr_bytes(mut self, bytes: usize) -> Self {
        self.config.max_stderr_bytes = bytes;
        self
    }

    /// Build the configuration, validating all fields.
    pub fn build(self) -> Result<GuardConfig, GuardError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_defaults() {
        let config = GuardConfig::default();
        assert_eq!(config.interpreter, PathBuf::from("python3"));
        assert_eq!(config.memory_limit_bytes, 128 * 1024 * 1024);
        assert_eq!(config.cpu_time_limit, Duration::from_secs(5));
        assert_eq!(config.wall_timeout, Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_uses_defaults() {
        let config = GuardConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, GuardConfig::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = GuardConfig::from_lookup(lookup_from(&[
            ("EXECGUARD_INTERPRETER", "/bin/sh"),
            ("EXECGUARD_MEMORY_MIB", "64"),
            ("EXECGUARD_CPU_SECS", "2"),
            ("EXECGUARD_TIMEOUT_SECS", " 3 "),
            ("EXECGUARD_MAX_STDERR_BYTES", "4096"),
        ]));
        assert_eq!(config.interpreter, PathBuf::from("/bin/sh"));
        assert_eq!(config.memory_limit_bytes, 64 * 1024 * 1024);
        assert_eq!(config.cpu_time_limit, Duration::from_secs(2));
        assert_eq!(config.wall_timeout, Duration::from_secs(3));
        assert_eq!(config.max_stderr_bytes, 4096);
    }

    #[test]
    fn test_from_lookup_bad_number_falls_back() {
        let config = GuardConfig::from_lookup(lookup_from(&[
            ("EXECGUARD_MEMORY_MIB", "lots"),
            ("EXECGUARD_TIMEOUT_SECS", "-1"),
        ]));
        assert_eq!(config.memory_limit_bytes, 128 * 1024 * 1024);
        assert_eq!(config.wall_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_builder_validation_zero_timeout() {
        let result = GuardConfig::builder().wall_timeout(Duration::ZERO).build();
        assert!(matches!(result, Err(GuardError::InvalidConfig(_))));
    }

    #[test]
    fn test_builder_validation_sub_second_cpu() {
        let result = GuardConfig::builder()
            .cpu_time_limit(Duration::from_millis(500))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_validation_empty_interpreter() {
        let result = GuardConfig::builder().interpreter("").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_success() {
        let config = GuardConfig::builder()
            .interpreter("/bin/sh")
            .memory_mib(256)
            .cpu_time_limit(Duration::from_secs(1))
            .wall_timeout(Duration::from_secs(2))
            .build()
            .expect("should build successfully");

        assert_eq!(config.interpreter, PathBuf::from("/bin/sh"));
        assert_eq!(config.memory_limit_bytes, 256 * 1024 * 1024);
        assert_eq!(
            config.limits(),
            ResourceLimits {
                address_space_bytes: 256 * 1024 * 1024,
                cpu_seconds: 1,
            }
        );
    }
}
