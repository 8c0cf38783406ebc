//! Error types for vodcheck-media.

use thiserror::Error;

/// Result type for vodcheck-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for vodcheck-media operations.
///
/// Every variant carries enough position detail to locate the defect in the
/// original fragment bytes.
#[derive(Debug, Error)]
pub enum Error {
    /// Input ended before a field could be read.
    #[error("Truncated {what} at offset {offset}: need {need} bytes, have {have}")]
    Truncated {
        what: &'static str,
        offset: usize,
        need: usize,
        have: usize,
    },

    /// Box header or layout is inconsistent.
    #[error("Invalid box at offset {offset}: {msg}")]
    InvalidBox { offset: usize, msg: String },

    /// Bootstrap or program table is malformed.
    #[error("Invalid table at offset {offset}: {msg}")]
    InvalidTable { offset: usize, msg: String },

    /// A fixed header field held an unexpected value.
    #[error("Invalid {what} at offset {offset}: expected {expected}, found {actual}")]
    InvalidHeader {
        what: &'static str,
        offset: usize,
        expected: String,
        actual: String,
    },

    /// Input uses a layout this crate does not decode.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Segment decryption failed.
    #[error("Decryption failed: {0}")]
    Decrypt(#[from] DecryptError),
}

impl Error {
    /// Create a truncation error.
    pub fn truncated(what: &'static str, offset: usize, need: usize, have: usize) -> Self {
        Self::Truncated {
            what,
            offset,
            need,
            have,
        }
    }

    /// Create an invalid box error.
    pub fn invalid_box(offset: usize, msg: impl Into<String>) -> Self {
        Self::InvalidBox {
            offset,
            msg: msg.into(),
        }
    }

    /// Create an invalid table error.
    pub fn invalid_table(offset: usize, msg: impl Into<String>) -> Self {
        Self::InvalidTable {
            offset,
            msg: msg.into(),
        }
    }

    /// Create an invalid header error.
    pub fn invalid_header(
        what: &'static str,
        offset: usize,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::InvalidHeader {
            what,
            offset,
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Create an unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}

/// Failure modes of AES-128-CBC segment decryption.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptError {
    /// Ciphertext is empty or not a multiple of the block size.
    #[error("ciphertext length {0} is not a positive multiple of 16")]
    NotBlockAligned(usize),

    /// Final plaintext byte is outside `1..=16`.
    #[error("pad length {0} out of range")]
    InvalidPadLength(u8),

    /// Trailing pad bytes disagree with the pad length.
    #[error("padding bytes do not match pad length")]
    InvalidPadding,

    /// Key or IV has the wrong size.
    #[error("invalid key or iv length")]
    InvalidKeyLength,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_position() {
        let err = Error::truncated("pes header", 376, 9, 4);
        assert_eq!(
            err.to_string(),
            "Truncated pes header at offset 376: need 9 bytes, have 4"
        );

        let err = Error::invalid_header("sync byte", 188, "0x47", "0x00");
        assert_eq!(
            err.to_string(),
            "Invalid sync byte at offset 188: expected 0x47, found 0x00"
        );
    }

    #[test]
    fn test_decrypt_error_converts() {
        let err: Error = DecryptError::InvalidPadLength(17).into();
        assert!(matches!(err, Error::Decrypt(DecryptError::InvalidPadLength(17))));
    }
}
