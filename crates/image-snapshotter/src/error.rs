//! Error types for the snapshotter

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while serving still requests
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SnapshotError {
    #[error("invalid timeout: {0}")]
    InvalidTimeout(f64),

    #[error("failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    #[error("interrupted while waiting for a publisher on {topic}")]
    Interrupted { topic: String },

    #[error("no response from the still service within {0:?}")]
    ClientTimeout(Duration),

    #[error("event bus closed")]
    BusClosed,
}
