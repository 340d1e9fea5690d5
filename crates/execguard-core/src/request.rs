//! The code and input for a single run.

/// Environment variable holding the submitted source.
pub const CODE_VAR: &str = "USER_CODE";

/// Environment variable holding the text fed to the program's stdin.
pub const INPUT_VAR: &str = "INPUT_DATA";

/// One submission: source text plus the entirety of its stdin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionRequest {
    /// Source code, passed to the interpreter unvalidated.
    pub code: String,
    /// Text the program reads from stdin, followed by EOF.
    pub input: String,
}

impl ExecutionRequest {
    /// Create a request from code and input.
    pub fn new(code: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            input: input.into(),
        }
    }

    /// Read `USER_CODE` and `INPUT_DATA`; missing or non-UTF-8 values are empty.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the request through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            code: lookup(CODE_VAR).unwrap_or_default(),
            input: lookup(INPUT_VAR).unwrap_or_default(),
        }
    }
}
