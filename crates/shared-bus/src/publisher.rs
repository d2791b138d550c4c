//! # Event Publisher
//!
//! Defines the publishing side of the event bus.

use crate::events::{BusEvent, EventFilter, Topic};
use crate::registry::{Lease, Role, TopicRegistry};
use crate::subscriber::{EventStream, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use shared_types::entities::CompressedImage;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Hand an event to the broadcast channel. Never blocks.
///
/// Returns the number of receivers the event reached.
fn deliver(sender: &broadcast::Sender<BusEvent>, event: BusEvent) -> usize {
    let topic = event.topic().clone();
    let kind = event.kind();
    match sender.send(event) {
        Ok(receiver_count) => {
            trace!(
                topic = %topic,
                kind = ?kind,
                receivers = receiver_count,
                "Event published"
            );
            receiver_count
        }
        Err(_) => {
            // No receivers - event is dropped. Normal for streams nobody watches.
            trace!(topic = %topic, kind = ?kind, "Event dropped (no receivers)");
            0
        }
    }
}

/// In-memory implementation of the event bus.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer semantics.
/// Publishing never waits on subscribers: a slow subscriber lags and loses
/// the oldest events instead of stalling the producer.
pub struct InMemoryEventBus {
    /// Broadcast sender for events.
    sender: broadcast::Sender<BusEvent>,

    /// Publisher/subscriber counts per topic.
    registry: Arc<TopicRegistry>,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryEventBus {
    /// Create a new in-memory event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new in-memory event bus with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            registry: Arc::new(TopicRegistry::new()),
            capacity,
        }
    }

    /// Subscribe to events matching a filter.
    ///
    /// Returns a `Subscription` handle that can be used to receive events.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        let receiver = self.sender.subscribe();
        let lease = self.registry.lease(Role::Subscriber, filter.topics.clone());

        debug!(topics = ?filter.topics, kinds = ?filter.kinds, "New subscription created");

        Subscription::new(receiver, filter, lease)
    }

    /// Get a stream of events matching a filter.
    ///
    /// Registered immediately, like `subscribe`.
    #[must_use]
    pub fn event_stream(&self, filter: EventFilter) -> EventStream {
        self.subscribe(filter).into_stream()
    }

    /// Register as a publisher of frames on `topic`.
    ///
    /// The registration lasts as long as the returned handle.
    #[must_use]
    pub fn advertise(&self, topic: impl Into<Topic>) -> PublisherHandle {
        let topic = topic.into();
        let lease = self.registry.lease(Role::Publisher, vec![topic.clone()]);

        debug!(topic = %topic, "Publisher advertised");

        PublisherHandle {
            topic,
            sender: self.sender.clone(),
            _lease: lease,
        }
    }

    /// Number of live publishers on `topic`.
    #[must_use]
    pub fn publisher_count(&self, topic: &Topic) -> usize {
        self.registry.count(Role::Publisher, topic)
    }

    /// Number of live subscriptions whose filter names `topic`.
    #[must_use]
    pub fn topic_subscriber_count(&self, topic: &Topic) -> usize {
        self.registry.count(Role::Subscriber, topic)
    }

    /// Get the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Publish an event. Returns the number of receivers it reached.
    pub fn send(&self, event: BusEvent) -> usize {
        deliver(&self.sender, event)
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Registration of a frame producer on one topic.
///
/// Dropping the handle withdraws the advertisement.
pub struct PublisherHandle {
    topic: Topic,
    sender: broadcast::Sender<BusEvent>,
    _lease: Lease,
}

impl PublisherHandle {
    /// Topic this handle publishes on.
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Publish one frame on the advertised topic.
    pub fn publish(&self, image: CompressedImage) -> usize {
        let event = BusEvent::Frame {
            topic: self.topic.clone(),
            image,
        };
        deliver(&self.sender, event)
    }
}
