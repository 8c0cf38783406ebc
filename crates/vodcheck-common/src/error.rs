//! Common error types used throughout vodcheck.

/// Common error type for vodcheck.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The content type does not map to any supported delivery format.
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Invalid input was provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Create a new UnsupportedContentType error.
    pub fn unsupported_content_type<S: Into<String>>(content_type: S) -> Self {
        Self::UnsupportedContentType(content_type.into())
    }

    /// Create a new InvalidInput error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
