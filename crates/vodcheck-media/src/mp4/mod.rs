//! ISO-BMFF box tree parsing.
//!
//! Fragments are parsed from an in-memory buffer that may be only a prefix of
//! the real fragment (the verifier fetches a header range). Boxes keep their
//! declared extents even when those run past the buffer; payload access is
//! clamped to what is actually available.

mod boxes;
mod tree;

pub use boxes::{Sidx, Tfdt, Tfhd, Tfxd, Trun, TrunSample, TFXD_GUID};
pub use tree::{BoxNode, BoxTree};

/// Four-character box type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const MOOF: Self = Self(*b"moof");
    pub const TRAF: Self = Self(*b"traf");
    pub const TFHD: Self = Self(*b"tfhd");
    pub const TFDT: Self = Self(*b"tfdt");
    pub const TRUN: Self = Self(*b"trun");
    pub const SIDX: Self = Self(*b"sidx");
    pub const MDAT: Self = Self(*b"mdat");
    pub const UUID: Self = Self(*b"uuid");

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Whether every byte is an ASCII letter or digit.
    pub fn is_alphanumeric(&self) -> bool {
        self.0.iter().all(|b| b.is_ascii_alphanumeric())
    }

    /// Get the 4-char code as a string.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl std::fmt::Display for FourCc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl PartialEq<&str> for FourCc {
    fn eq(&self, other: &&str) -> bool {
        other.as_bytes() == self.0
    }
}
