//! Error types for Buildtrace.
//!
//! Library crates use [`BuildtraceError`] via `thiserror`.
//! The server binary wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Buildtrace operations.
#[derive(Debug, thiserror::Error)]
pub enum BuildtraceError {
    /// Configuration loading or validation error. Fatal at construction time:
    /// no crawler instance is created from an invalid configuration.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while talking to a CI system.
    #[error("network error: {0}")]
    Network(String),

    /// Malformed JSON or console output from a CI system.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Build record not present in storage.
    #[error("build {build_id} not found")]
    NotFound { build_id: String },

    /// Request payload validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BuildtraceError>;

impl BuildtraceError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a not-found error for a build ID.
    pub fn not_found(build_id: impl Into<String>) -> Self {
        Self::NotFound {
            build_id: build_id.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for [`BuildtraceError::NotFound`]; lets callers branch on a
    /// missing record without destructuring.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = BuildtraceError::config("missing log pattern");
        assert_eq!(err.to_string(), "config error: missing log pattern");

        let err = BuildtraceError::not_found("b-42");
        assert!(err.to_string().contains("b-42"));
        assert!(err.is_not_found());
    }
}
