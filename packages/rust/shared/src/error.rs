//! Error types for the page-generation pipeline.
//!
//! Library crates use [`PagegenError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for all pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PagegenError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error outside the gateway (client construction, etc.).
    #[error("network error: {0}")]
    Network(String),

    /// Content decoding error (entry fields, rich text, dates).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (duplicate slugs, bad config values, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The content store refused the request; the gateway did not retry it.
    #[error("fetch rejected for `{operation}`{}: {message}", fmt_status(.status))]
    FetchRejected {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    /// A retryable failure persisted past the gateway's attempt ceiling.
    #[error(
        "fetch exhausted for `{operation}` after {attempts} attempts (last status {last_status})"
    )]
    FetchExhausted {
        operation: String,
        attempts: u32,
        last_status: u16,
    },

    /// One attempt held a gateway slot for longer than its time limit.
    #[error("fetch timed out for `{operation}` after {after:?}")]
    FetchTimedOut { operation: String, after: Duration },
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PagegenError>;

impl PagegenError {
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

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Logical operation name for gateway failures, if this is one.
    pub fn operation(&self) -> Option<&str> {
        match self {
            Self::FetchRejected { operation, .. }
            | Self::FetchExhausted { operation, .. }
            | Self::FetchTimedOut { operation, .. } => Some(operation),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PagegenError::config("concurrency must be at least 1");
        assert_eq!(err.to_string(), "config error: concurrency must be at least 1");

        let err = PagegenError::validation("duplicate service slug `implants`");
        assert!(err.to_string().contains("implants"));
    }

    #[test]
    fn fetch_errors_name_the_operation() {
        let err = PagegenError::FetchExhausted {
            operation: "catalogue:service".into(),
            attempts: 6,
            last_status: 503,
        };
        assert_eq!(
            err.to_string(),
            "fetch exhausted for `catalogue:service` after 6 attempts (last status 503)"
        );
        assert_eq!(err.operation(), Some("catalogue:service"));

        let err = PagegenError::FetchRejected {
            operation: "catalogue:location".into(),
            status: Some(404),
            message: "not found".into(),
        };
        assert_eq!(
            err.to_string(),
            "fetch rejected for `catalogue:location` (HTTP 404): not found"
        );

        let err = PagegenError::FetchRejected {
            operation: "page:implants/leeds".into(),
            status: None,
            message: "connection reset".into(),
        };
        assert!(!err.to_string().contains("HTTP"));

        let err = PagegenError::FetchTimedOut {
            operation: "page:implants/leeds".into(),
            after: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "fetch timed out for `page:implants/leeds` after 30s"
        );
        assert_eq!(err.operation(), Some("page:implants/leeds"));
        assert_eq!(PagegenError::config("bad").operation(), None);
    }
}
