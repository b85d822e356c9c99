//! Error types for spectest

use thiserror::Error;

/// Result type alias using spectest Error
pub type Result<T> = std::result::Result<T, Error>;

/// Run-level errors.
///
/// Everything here aborts the run. Assertion and transport failures are not
/// errors: they are recorded on the [`TestResult`](crate::TestResult) of the
/// test that produced them.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid filter pattern: {0}")]
    InvalidFilter(#[from] regex::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Test case at index {index} is missing a name")]
    MissingName { index: usize },

    #[error("Test '{name}' is missing an endpoint")]
    MissingEndpoint { name: String },

    #[error("Duplicate test name '{0}' detected")]
    DuplicateName(String),

    #[error("Duplicate operationId '{0}' detected")]
    DuplicateOperationId(String),

    #[error("Test '{name}' has invalid rps value '{value}'")]
    InvalidRps { name: String, value: f64 },

    #[error("{hook} hook of test '{test}' failed: {message}")]
    Hook {
        hook: &'static str,
        test: String,
        message: String,
    },

    #[error("Plugin '{plugin}' failed: {message}")]
    Plugin { plugin: String, message: String },

    #[error("Suite error: {0}")]
    Suite(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Target process error: {0}")]
    Target(String),

    #[error("Rate limiter stopped")]
    RateLimiterStopped,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap an arbitrary error raised by a test hook.
    pub fn hook(hook: &'static str, test: &str, err: impl std::fmt::Display) -> Self {
        Error::Hook {
            hook,
            test: test.to_string(),
            message: err.to_string(),
        }
    }

    /// Wrap an arbitrary error raised by a plugin callback.
    pub fn plugin(plugin: &str, err: impl std::fmt::Display) -> Self {
        Error::Plugin {
            plugin: plugin.to_string(),
            message: err.to_string(),
        }
    }

    /// Whether the error stems from loading or validating test definitions.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidConfig(_)
                | Error::MissingName { .. }
                | Error::MissingEndpoint { .. }
                | Error::DuplicateName(_)
                | Error::DuplicateOperationId(_)
                | Error::InvalidRps { .. }
                | Error::InvalidFilter(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_error_message() {
        let err = Error::hook("beforeSend", "login", "boom");
        assert_eq!(err.to_string(), "beforeSend hook of test 'login' failed: boom");
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_configuration_classification() {
        assert!(Error::DuplicateOperationId("a".into()).is_configuration());
        assert!(Error::MissingEndpoint { name: "x".into() }.is_configuration());
        assert!(!Error::Target("exited early".into()).is_configuration());
    }
}
