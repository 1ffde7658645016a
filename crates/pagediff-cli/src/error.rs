//! Error types for the CLI

use thiserror::Error;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// HTTP server error
    #[error("Server error: {message}")]
    Server {
        /// Error message
        message: String,
    },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// pagediff library error
    #[error(transparent)]
    PageDiff(#[from] pagediff::PageDiffError),
}

impl CliError {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a server error
    #[must_use]
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_library_errors_display_unchanged() {
        let inner = pagediff::PageDiffError::not_found("page", "p1");
        let shown = inner.to_string();
        let err: CliError = inner.into();
        assert_eq!(err.to_string(), shown);
    }

    #[test]
    fn test_constructors() {
        assert!(CliError::config("bad").to_string().contains("bad"));
        assert!(CliError::invalid_argument("x").to_string().starts_with("Invalid argument"));
        assert!(CliError::server("bind").to_string().contains("bind"));
    }
}
