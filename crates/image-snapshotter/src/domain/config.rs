//! Broker configuration and timeout resolution.

use crate::error::SnapshotError;
use shared_bus::Topic;
use std::time::{Duration, Instant};

/// Topic the broker captures from unless configured otherwise.
pub const DEFAULT_IMAGE_TOPIC: &str = "image_raw/compressed";

/// Service topic still requests arrive on unless configured otherwise.
pub const DEFAULT_SERVICE_TOPIC: &str = "get_still";

/// Wait applied when a request asks for a timeout of zero.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Static configuration of a `SnapshotBroker`.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerConfig {
    /// Stream frames are captured from.
    pub image_topic: Topic,
    /// Wait used when a request passes `0.0`.
    pub default_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            image_topic: Topic::new(DEFAULT_IMAGE_TOPIC),
            default_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl BrokerConfig {
    /// Config capturing from `image_topic` with the default timeout.
    #[must_use]
    pub fn for_topic(image_topic: impl Into<Topic>) -> Self {
        Self {
            image_topic: image_topic.into(),
            ..Self::default()
        }
    }

    /// Turn a requested timeout into a wait duration.
    ///
    /// Zero selects `default_timeout`. Negative, NaN and infinite values are
    /// rejected, as are waits whose deadline the clock cannot represent.
    pub fn resolve_timeout(&self, timeout_secs: f64) -> Result<Duration, SnapshotError> {
        if timeout_secs == 0.0 {
            return Ok(self.default_timeout);
        }
        let timeout = Duration::try_from_secs_f64(timeout_secs)
            .map_err(|_| SnapshotError::InvalidTimeout(timeout_secs))?;
        match Instant::now().checked_add(timeout) {
            Some(_) => Ok(timeout),
            None => Err(SnapshotError::InvalidTimeout(timeout_secs)),
        }
    }
}
