//! # Core Domain Entities
//!
//! Defines the image and request identity types shared by the bus, the
//! broker and its clients.
//!
//! ## Clusters
//!
//! - **Identity**: `RequestId`
//! - **Imagery**: `Timestamp`, `FrameHeader`, `CompressedImage`

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// Correlation handle for a single still request.
///
/// Generated by the caller, carried through the bus unchanged, and used by
/// the broker to address exactly one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh request id (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from the hyphenated string form.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    /// Get the underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// =============================================================================
// CLUSTER B: IMAGERY
// =============================================================================

/// Acquisition time of a frame, split the way camera drivers stamp them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Timestamp {
    /// Whole seconds since the Unix epoch.
    pub sec: i64,
    /// Nanoseconds past `sec` (always < 1e9).
    pub nanosec: u32,
}

impl Timestamp {
    /// Current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            sec: elapsed.as_secs() as i64,
            nanosec: elapsed.subsec_nanos(),
        }
    }

    /// Milliseconds since the Unix epoch.
    #[must_use]
    pub fn as_millis(&self) -> i64 {
        self.sec * 1_000 + i64::from(self.nanosec / 1_000_000)
    }
}

/// Metadata carried with every frame.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameHeader {
    /// When the frame was captured.
    pub stamp: Timestamp,
    /// Coordinate frame / camera the image belongs to.
    pub frame_id: String,
}

/// One compressed image as published on an image topic.
///
/// The payload is a reference-counted buffer so fan-out to several
/// subscribers does not copy pixel data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompressedImage {
    /// Capture metadata.
    pub header: FrameHeader,
    /// Encoding tag, e.g. `jpeg` or `png`.
    pub format: String,
    /// Encoded image bytes.
    pub data: Bytes,
}

impl CompressedImage {
    /// Build an image from its parts.
    #[must_use]
    pub fn new(header: FrameHeader, format: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            header,
            format: format.into(),
            data: data.into(),
        }
    }

    /// Size of the encoded payload in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
