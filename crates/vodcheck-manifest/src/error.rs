//! Error types for vodcheck-manifest.

use thiserror::Error;

/// Result type for enumeration.
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Failure of a single fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection, TLS or protocol failure.
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The per-fetch timeout elapsed.
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// The server answered with a non-2xx status.
    #[error("Request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// The body exceeded the configured cap.
    #[error("Response from {url} exceeds {limit} bytes")]
    BodyTooLarge { url: String, limit: usize },

    /// Fewer or more bytes arrived than `Content-Length` declared.
    #[error("Response from {url} declared {expected} bytes but carried {actual}")]
    LengthMismatch {
        url: String,
        expected: u64,
        actual: u64,
    },

    /// The body could not be decoded (e.g. broken gzip stream).
    #[error("Response from {url} could not be decoded: {message}")]
    Decode { url: String, message: String },
}

impl FetchError {
    pub fn transport(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn status(url: impl Into<String>, status: u16) -> Self {
        Self::Status {
            url: url.into(),
            status,
        }
    }

    /// URL the failed request was sent to.
    pub fn url(&self) -> &str {
        match self {
            Self::Transport { url, .. }
            | Self::Timeout { url }
            | Self::Status { url, .. }
            | Self::BodyTooLarge { url, .. }
            | Self::LengthMismatch { url, .. }
            | Self::Decode { url, .. } => url,
        }
    }

    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Failure to enumerate a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// The XML document is malformed.
    #[error("Malformed XML in {url}: {message}")]
    Xml { url: String, message: String },

    /// The document is well-formed but its content cannot be interpreted.
    #[error("Cannot parse {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// A reference could not be resolved to an absolute URL.
    #[error("Cannot resolve {reference} against {base}: {message}")]
    Url {
        base: String,
        reference: String,
        message: String,
    },
}

impl ManifestError {
    pub fn xml(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Xml {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn parse(url: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

impl From<vodcheck_common::Error> for ManifestError {
    fn from(err: vodcheck_common::Error) -> Self {
        match err {
            vodcheck_common::Error::UnsupportedContentType(ct) => Self::UnsupportedContentType(ct),
            other => Self::Parse {
                url: String::new(),
                message: other.to_string(),
            },
        }
    }
}
