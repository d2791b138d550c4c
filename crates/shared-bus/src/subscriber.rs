//! # Event Subscriber
//!
//! Defines the subscription side of the event bus.

use crate::events::{BusEvent, EventFilter};
use crate::registry::Lease;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::debug;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The event bus was closed.
    #[error("Event bus closed")]
    Closed,
}

/// A subscription handle for receiving events.
///
/// Only events published after the subscription was created are seen.
/// When dropped, the subscription is automatically unregistered.
#[derive(Debug)]
pub struct Subscription {
    /// The broadcast receiver.
    receiver: broadcast::Receiver<BusEvent>,

    /// Filter for this subscription.
    filter: EventFilter,

    /// Registry entry for the filter's topics.
    lease: Lease,
}

impl Subscription {
    /// Create a new subscription.
    pub(crate) fn new(
        receiver: broadcast::Receiver<BusEvent>,
        filter: EventFilter,
        lease: Lease,
    ) -> Self {
        Self {
            receiver,
            filter,
            lease,
        }
    }

    /// Receive the next event that matches the filter.
    ///
    /// # Returns
    ///
    /// - `Some(event)` - The next matching event
    /// - `None` - The channel was closed (bus dropped)
    pub async fn recv(&mut self) -> Option<BusEvent> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(e) => e,
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "Subscriber lagged, some events dropped");
                    continue;
                }
            };

            if self.filter.matches(&event) {
                return Some(event);
            }
        }
    }

    /// Try to receive the next event without blocking.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(event))` - An event was available and matched
    /// - `Ok(None)` - No event available (would block)
    /// - `Err(SubscriptionError::Closed)` - The channel was closed
    pub fn try_recv(&mut self) -> Result<Option<BusEvent>, SubscriptionError> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(e) => e,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            };

            if self.filter.matches(&event) {
                return Ok(Some(event));
            }
        }
    }

    /// Get the filter for this subscription.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Turn this subscription into a `Stream` of matching events.
    #[must_use]
    pub fn into_stream(self) -> EventStream {
        EventStream::new(self)
    }
}

/// A stream wrapper for subscriptions.
///
/// Implements `tokio_stream::Stream` for use with stream combinators.
pub struct EventStream {
    inner: BroadcastStream<BusEvent>,
    filter: EventFilter,
    _lease: Lease,
}

impl EventStream {
    /// Create a new event stream from a subscription.
    #[must_use]
    pub fn new(subscription: Subscription) -> Self {
        let Subscription {
            receiver,
            filter,
            lease,
        } = subscription;
        Self {
            inner: BroadcastStream::new(receiver),
            filter,
            _lease: lease,
        }
    }

    /// Get the filter for this stream.
    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

impl Stream for EventStream {
    type Item = BusEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match ready!(Pin::new(&mut this.inner).poll_next(cx)) {
                Some(Ok(event)) => {
                    if this.filter.matches(&event) {
                        return Poll::Ready(Some(event));
                    }
                }
                Some(Err(BroadcastStreamRecvError::Lagged(count))) => {
                    debug!(lagged = count, "Stream lagged, some events dropped");
                }
                None => return Poll::Ready(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Topic;
    use crate::publisher::InMemoryEventBus;
    use futures::StreamExt;
    use shared_types::entities::CompressedImage;
    use std::time::Duration;
    use tokio::time::timeout;

    fn frame_on(topic: &str, format: &str) -> BusEvent {
        BusEvent::Frame {
            topic: topic.into(),
            image: CompressedImage::new(Default::default(), format, vec![1u8]),
        }
    }

    #[tokio::test]
    async fn test_subscription_recv() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());

        bus.send(frame_on("cam", "jpeg"));

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("event");

        assert!(matches!(received, BusEvent::Frame { .. }));
    }

    #[tokio::test]
    async fn test_subscription_filter() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::frames("cam"));

        bus.send(frame_on("other", "png"));
        bus.send(frame_on("cam", "jpeg"));

        let received = timeout(Duration::from_millis(100), sub.recv())
            .await
            .expect("timeout")
            .expect("event");

        match received {
            BusEvent::Frame { topic, image } => {
                assert_eq!(topic, Topic::new("cam"));
                assert_eq!(image.format, "jpeg");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscription_drop_cleanup() {
        let bus = InMemoryEventBus::new();
        let topic = Topic::new("cam");

        {
            let _sub1 = bus.subscribe(EventFilter::frames("cam"));
            let _sub2 = bus.subscribe(EventFilter::frames("cam"));
            assert_eq!(bus.subscriber_count(), 2);
            assert_eq!(bus.topic_subscriber_count(&topic), 2);
        }

        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.topic_subscriber_count(&topic), 0);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::all());

        let result = sub.try_recv();
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_try_recv_skips_unmatched() {
        let bus = InMemoryEventBus::new();
        let mut sub = bus.subscribe(EventFilter::frames("cam"));

        bus.send(frame_on("other", "png"));
        assert!(matches!(sub.try_recv(), Ok(None)));

        bus.send(frame_on("cam", "jpeg"));
        assert!(matches!(sub.try_recv(), Ok(Some(BusEvent::Frame { .. }))));
    }

    #[tokio::test]
    async fn test_subscription_misses_earlier_events() {
        let bus = InMemoryEventBus::new();
        let _keepalive = bus.subscribe(EventFilter::all());
        bus.send(frame_on("cam", "jpeg"));

        let mut late = bus.subscribe(EventFilter::frames("cam"));
        assert!(matches!(late.try_recv(), Ok(None)));
    }

    #[tokio::test]
    async fn test_event_stream_yields_matching_events() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.event_stream(EventFilter::frames("cam"));

        bus.send(frame_on("other", "png"));
        bus.send(frame_on("cam", "jpeg"));

        let received = timeout(Duration::from_millis(100), stream.next())
            .await
            .expect("timeout")
            .expect("event");
        assert_eq!(received.topic(), &Topic::new("cam"));
    }

    #[tokio::test]
    async fn test_event_stream_ends_when_bus_dropped() {
        let bus = InMemoryEventBus::new();
        let mut stream = bus.event_stream(EventFilter::all());
        drop(bus);

        let next = timeout(Duration::from_millis(100), stream.next())
            .await
            .expect("timeout");
        assert!(next.is_none());
    }

    #[test]
    fn test_event_stream_filter() {
        let bus = InMemoryEventBus::new();
        let stream = bus.event_stream(EventFilter::frames("cam"));

        assert_eq!(EventStream::filter(&stream).topics.len(), 1);
        assert_eq!(EventStream::filter(&stream).topics[0], Topic::new("cam"));
    }
}
