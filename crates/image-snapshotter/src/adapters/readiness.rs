//! Producer readiness over the shared bus.

use crate::error::SnapshotError;
use crate::ports::ProducerMonitor;
use async_trait::async_trait;
use shared_bus::{InMemoryEventBus, Topic};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// How often the publisher count is polled.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// `ProducerMonitor` polling the bus topic registry.
#[derive(Clone)]
pub struct BusProducerMonitor {
    bus: Arc<InMemoryEventBus>,
    poll_interval: Duration,
}

impl BusProducerMonitor {
    pub fn new(bus: Arc<InMemoryEventBus>) -> Self {
        Self {
            bus,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl ProducerMonitor for BusProducerMonitor {
    async fn wait_for_producer(
        &self,
        topic: &Topic,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), SnapshotError> {
        let interrupted = || SnapshotError::Interrupted {
            topic: topic.to_string(),
        };
        if *shutdown.borrow_and_update() {
            return Err(interrupted());
        }

        loop {
            if self.bus.publisher_count(topic) > 0 {
                info!(topic = %topic, "Publisher found. Ready to get stills.");
                return Ok(());
            }
            warn!(topic = %topic, "Waiting for a publisher on {topic}");

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Err(interrupted());
                    }
                }
            }
        }
    }
}
