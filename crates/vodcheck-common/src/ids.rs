//! Rendition identifiers.
//!
//! Renditions are named by whatever the manifest offers: a bitrate, a
//! representation id or a quality-level index. The newtype keeps these
//! strings from being mixed up with URLs or other free text.

use serde::{Deserialize, Serialize};

/// Identifier of one quality/bitrate/track variant of an asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenditionId(String);

impl RenditionId {
    /// Create a rendition id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a rendition id from a declared bandwidth.
    pub fn from_bandwidth(bandwidth: u64) -> Self {
        Self(bandwidth.to_string())
    }

    /// Create a rendition id from a 1-based ordinal, used when the manifest
    /// declares nothing better.
    pub fn from_ordinal(ordinal: usize) -> Self {
        Self(format!("r{}", ordinal))
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RenditionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RenditionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RenditionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendition_id_constructors() {
        assert_eq!(RenditionId::from_bandwidth(800_000).as_str(), "800000");
        assert_eq!(RenditionId::from_ordinal(3).as_str(), "r3");
        assert_eq!(RenditionId::from("video_eng=1").to_string(), "video_eng=1");
    }

    #[test]
    fn test_rendition_id_serialization() {
        let id = RenditionId::new("720p");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"720p\"");
        let back: RenditionId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn test_rendition_id_ordering() {
        let mut ids = vec![RenditionId::new("b"), RenditionId::new("a")];
        ids.sort();
        assert_eq!(ids[0].as_str(), "a");
    }
}
