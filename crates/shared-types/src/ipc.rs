//! # Service Payloads
//!
//! Request/response pair of the `get_still` service. Requests and responses
//! are matched by the `RequestId` carried next to them on the bus, never by
//! a field inside the payload.

use crate::entities::CompressedImage;
use serde::{Deserialize, Serialize};

/// Ask for one still image.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GetStillRequest {
    /// Seconds to wait for a frame. `0.0` selects the server default.
    pub timeout_secs: f64,
}

impl GetStillRequest {
    /// Request with an explicit timeout.
    #[must_use]
    pub fn with_timeout(timeout_secs: f64) -> Self {
        Self { timeout_secs }
    }
}

/// Answer to a `GetStillRequest`.
///
/// `reason` is set iff `success` is false, `still` is set iff `success` is
/// true. Use the constructors to keep that pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetStillResponse {
    /// Whether a still was captured.
    pub success: bool,
    /// Why the request failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The captured image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub still: Option<CompressedImage>,
}

impl GetStillResponse {
    /// Successful capture.
    #[must_use]
    pub fn captured(still: CompressedImage) -> Self {
        Self {
            success: true,
            reason: None,
            still: Some(still),
        }
    }

    /// Failed request with a human-readable reason.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: Some(reason.into()),
            still: None,
        }
    }

    /// Convert into a `Result`, consuming the response.
    pub fn into_result(self) -> Result<CompressedImage, String> {
        match (self.success, self.still) {
            (true, Some(still)) => Ok(still),
            (_, _) => Err(self
                .reason
                .unwrap_or_else(|| "response carried no image".to_string())),
        }
    }
}
