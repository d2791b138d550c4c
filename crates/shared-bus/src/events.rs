//! # Bus Events
//!
//! Defines all event types that flow through the shared bus, and the
//! filters subscribers use to select them.

use serde::{Deserialize, Serialize};
use shared_types::entities::{CompressedImage, RequestId};
use shared_types::ipc::{GetStillRequest, GetStillResponse};
use std::fmt;

/// Name of a stream or service on the bus, e.g. `image_raw/compressed`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Create a topic from its name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The topic name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Topic {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// All events that can be published to the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BusEvent {
    // =========================================================================
    // STREAMS
    // =========================================================================
    /// A frame published on an image stream.
    Frame {
        /// Stream the frame was published on.
        topic: Topic,
        /// The frame itself.
        image: CompressedImage,
    },

    // =========================================================================
    // SERVICES
    // =========================================================================
    /// A still request addressed to a service.
    /// The server answers with `GetStillResponse` carrying the same `request_id`.
    GetStillRequest {
        /// Service the request is addressed to.
        service: Topic,
        /// Correlation handle chosen by the caller.
        request_id: RequestId,
        /// Request payload.
        request: GetStillRequest,
    },

    /// Answer to a still request.
    GetStillResponse {
        /// Service that produced the answer.
        service: Topic,
        /// Correlation handle of the original request.
        request_id: RequestId,
        /// Response payload.
        response: GetStillResponse,
    },
}

impl BusEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> &Topic {
        match self {
            Self::Frame { topic, .. } => topic,
            Self::GetStillRequest { service, .. } | Self::GetStillResponse { service, .. } => {
                service
            }
        }
    }

    /// Get the kind of this event (for filtering).
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Frame { .. } => EventKind::Frame,
            Self::GetStillRequest { .. } => EventKind::ServiceRequest,
            Self::GetStillResponse { .. } => EventKind::ServiceResponse,
        }
    }
}

/// Coarse event classes for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Stream data.
    Frame,
    /// Service call.
    ServiceRequest,
    /// Service reply.
    ServiceResponse,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<Topic>,
    /// Event kinds to include. Empty means all kinds.
    pub kinds: Vec<EventKind>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<Topic>) -> Self {
        Self {
            topics,
            kinds: Vec::new(),
        }
    }

    /// Frames published on one stream.
    #[must_use]
    pub fn frames(topic: impl Into<Topic>) -> Self {
        Self {
            topics: vec![topic.into()],
            kinds: vec![EventKind::Frame],
        }
    }

    /// Requests addressed to one service.
    #[must_use]
    pub fn service_requests(service: impl Into<Topic>) -> Self {
        Self {
            topics: vec![service.into()],
            kinds: vec![EventKind::ServiceRequest],
        }
    }

    /// Responses produced by one service.
    #[must_use]
    pub fn service_responses(service: impl Into<Topic>) -> Self {
        Self {
            topics: vec![service.into()],
            kinds: vec![EventKind::ServiceResponse],
        }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &BusEvent) -> bool {
        let topic_match = self.topics.is_empty() || self.topics.contains(event.topic());
        let kind_match = self.kinds.is_empty() || self.kinds.contains(&event.kind());

        topic_match && kind_match
    }
}
