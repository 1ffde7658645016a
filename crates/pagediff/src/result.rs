//! Result and error types for pagediff.

use thiserror::Error;

/// Result type for pagediff operations
pub type PageDiffResult<T> = Result<T, PageDiffError>;

/// Errors that can occur while capturing, diffing, or managing baselines
#[derive(Debug, Error)]
pub enum PageDiffError {
    /// Capture never produced an image (navigation, network, DNS, launch)
    #[error("Render of {url} failed: {message}")]
    Render {
        /// URL being captured
        url: String,
        /// Error message
        message: String,
    },

    /// Capture exceeded its hard timeout
    #[error("Capture of {url} timed out after {ms}ms")]
    CaptureTimeout {
        /// URL being captured
        url: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Stored bytes missing, unreadable, or not a valid raster image
    #[error("Image I/O failed: {message}")]
    ImageIo {
        /// Error message
        message: String,
    },

    /// Two buffers handed to the diff engine without normalization
    #[error("Image dimensions differ: expected {expected:?}, got {actual:?}")]
    DimensionMismatch {
        /// Dimensions of the first image
        expected: (u32, u32),
        /// Dimensions of the second image
        actual: (u32, u32),
    },

    /// Lookup of a website, page, comparison, or stored image failed
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind ("page", "comparison", ...)
        kind: &'static str,
        /// Identifier or reference that was looked up
        id: String,
    },

    /// Content store or repository failure
    #[error("Store error: {message}")]
    Store {
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Failure notification could not be delivered
    #[error("Notification failed: {message}")]
    Notification {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl PageDiffError {
    /// Create an image I/O error
    #[must_use]
    pub fn image_io(message: impl Into<String>) -> Self {
        Self::ImageIo {
            message: message.into(),
        }
    }

    /// Create a store error
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a not-found error
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Whether capture failed before producing an image
    #[must_use]
    pub const fn is_render_failure(&self) -> bool {
        matches!(self, Self::Render { .. } | Self::CaptureTimeout { .. })
    }

    /// Whether the error concerns unreadable or missing image bytes
    #[must_use]
    pub fn is_image_io(&self) -> bool {
        matches!(
            self,
            Self::ImageIo { .. }
                | Self::NotFound {
                    kind: "image",
                    ..
                }
        )
    }
}
