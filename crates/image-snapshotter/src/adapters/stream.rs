//! Frame stream adapter over the shared bus.
//!
//! Each subscription owns a forwarder task that moves frames from the bus
//! into the dispatcher queue, tagged with the request the subscription was
//! opened for.

use crate::error::SnapshotError;
use crate::ports::FrameSource;
use crate::service::{BrokerEvent, EventSink};
use shared_bus::{BusEvent, EventFilter, InMemoryEventBus, Topic};
use shared_types::entities::RequestId;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

/// `FrameSource` backed by `InMemoryEventBus` subscriptions.
#[derive(Clone)]
pub struct BusFrameSource {
    bus: Arc<InMemoryEventBus>,
    sink: EventSink,
}

impl BusFrameSource {
    pub fn new(bus: Arc<InMemoryEventBus>, sink: EventSink) -> Self {
        Self { bus, sink }
    }
}

/// A live frame subscription. Dropping it stops the forwarder.
#[derive(Debug)]
pub struct FrameSubscription {
    topic: Topic,
    request_id: RequestId,
    forwarder: JoinHandle<()>,
}

impl FrameSubscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn request_id(&self) -> RequestId {
        self.request_id
    }
}

impl Drop for FrameSubscription {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

impl FrameSource for BusFrameSource {
    type Subscription = FrameSubscription;

    fn subscribe(
        &self,
        topic: &Topic,
        request_id: RequestId,
    ) -> Result<FrameSubscription, SnapshotError> {
        let runtime = Handle::try_current().map_err(|e| SnapshotError::Subscribe {
            topic: topic.to_string(),
            reason: e.to_string(),
        })?;

        // Registered before returning so no frame published after admission is missed.
        let frames = self
            .bus
            .event_stream(EventFilter::frames(topic.clone()))
            .filter_map(|event| match event {
                BusEvent::Frame { image, .. } => Some(image),
                _ => None,
            });
        let sink = self.sink.clone();

        let forwarder = runtime.spawn(async move {
            tokio::pin!(frames);
            while let Some(image) = frames.next().await {
                trace!(request_id = %request_id, bytes = image.len(), "Forwarding frame");
                let posted = sink.post(BrokerEvent::FrameReceived {
                    request_id,
                    frame: image,
                });
                if !posted {
                    break;
                }
            }
        });

        debug!(topic = %topic, request_id = %request_id, "Frame subscription opened");
        Ok(FrameSubscription {
            topic: topic.clone(),
            request_id,
            forwarder,
        })
    }

    fn unsubscribe(&self, subscription: FrameSubscription) {
        debug!(
            topic = %subscription.topic,
            request_id = %subscription.request_id,
            "Frame subscription released"
        );
        drop(subscription);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::channel;
    use shared_types::entities::{CompressedImage, FrameHeader};
    use std::time::Duration;

    async fn wait_for_subscribers(bus: &InMemoryEventBus, topic: &Topic, expected: usize) {
        for _ in 0..200 {
            if bus.topic_subscriber_count(topic) == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("subscriber count on {topic} never reached {expected}");
    }

    #[tokio::test]
    async fn test_frames_are_forwarded_with_request_id() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (sink, mut events) = channel();
        let source = BusFrameSource::new(bus.clone(), sink);
        let topic = Topic::new("image_raw/compressed");
        let camera = bus.advertise(topic.clone());
        let id = RequestId::new();

        let subscription = source.subscribe(&topic, id).unwrap();
        assert_eq!(subscription.request_id(), id);
        camera.publish(CompressedImage::new(FrameHeader::default(), "jpeg", vec![7]));

        match events.recv().await.unwrap() {
            BrokerEvent::FrameReceived { request_id, frame } => {
                assert_eq!(request_id, id);
                assert_eq!(&frame.data[..], &[7]);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        source.unsubscribe(subscription);
    }

    #[tokio::test]
    async fn test_every_frame_is_forwarded_in_order() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (sink, mut events) = channel();
        let source = BusFrameSource::new(bus.clone(), sink);
        let topic = Topic::new("image_raw/compressed");
        let camera = bus.advertise(topic.clone());

        let _subscription = source.subscribe(&topic, RequestId::new()).unwrap();
        for seq in 1..=3u8 {
            camera.publish(CompressedImage::new(FrameHeader::default(), "jpeg", vec![seq]));
        }

        for seq in 1..=3u8 {
            match events.recv().await.unwrap() {
                BrokerEvent::FrameReceived { frame, .. } => assert_eq!(&frame.data[..], &[seq]),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_other_topics_are_not_forwarded() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (sink, mut events) = channel();
        let source = BusFrameSource::new(bus.clone(), sink);
        let other = bus.advertise("depth/compressed");

        let _subscription = source
            .subscribe(&Topic::new("image_raw/compressed"), RequestId::new())
            .unwrap();
        other.publish(CompressedImage::default());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unsubscribe_releases_bus_subscription() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (sink, _events) = channel();
        let source = BusFrameSource::new(bus.clone(), sink);
        let topic = Topic::new("image_raw/compressed");

        let subscription = source.subscribe(&topic, RequestId::new()).unwrap();
        assert_eq!(bus.topic_subscriber_count(&topic), 1);

        source.unsubscribe(subscription);
        wait_for_subscribers(&bus, &topic, 0).await;
    }

    #[test]
    fn test_subscribe_outside_runtime_fails() {
        let bus = Arc::new(InMemoryEventBus::new());
        let (sink, _events) = channel();
        let source = BusFrameSource::new(bus, sink);

        let err = source
            .subscribe(&Topic::new("image_raw/compressed"), RequestId::new())
            .unwrap_err();
        assert!(matches!(err, SnapshotError::Subscribe { .. }));
    }
}
