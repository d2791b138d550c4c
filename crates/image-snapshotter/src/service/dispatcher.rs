//! Broker event dispatch
//!
//! Every trigger that moves the broker (a still request, a frame, a timer
//! firing) is posted as a `BrokerEvent` into one unbounded channel. A single
//! `BrokerDispatcher` task drains it, so broker handlers never run
//! concurrently and need no locks.
//!
//! ```text
//! GetStillServer ──┐
//! frame forwarder ─┼──→ EventSink ──→ [mpsc] ──→ BrokerDispatcher ──→ SnapshotBroker
//! timer task ──────┘
//! ```

use crate::ports::{FrameSource, Responder, TimerService};
use crate::service::SnapshotBroker;
use shared_types::entities::{CompressedImage, RequestId};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

/// One trigger for the broker, tagged with the request it concerns.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// A caller asked for a still.
    GetStill {
        request_id: RequestId,
        timeout_secs: f64,
    },
    /// The subscription opened for `request_id` delivered a frame.
    FrameReceived {
        request_id: RequestId,
        frame: CompressedImage,
    },
    /// The timer armed for `request_id` fired.
    TimerFired { request_id: RequestId },
}

impl BrokerEvent {
    /// Request the event concerns.
    pub fn request_id(&self) -> RequestId {
        match self {
            Self::GetStill { request_id, .. }
            | Self::FrameReceived { request_id, .. }
            | Self::TimerFired { request_id } => *request_id,
        }
    }
}

/// Non-blocking entry into the dispatcher queue.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<BrokerEvent>,
}

impl EventSink {
    /// Queue an event. Returns `false` once the dispatcher is gone.
    pub fn post(&self, event: BrokerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// Create the dispatcher queue.
pub fn channel() -> (EventSink, mpsc::UnboundedReceiver<BrokerEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (EventSink { sender }, receiver)
}

/// Serializes all broker events onto one task.
pub struct BrokerDispatcher<F: FrameSource, T: TimerService, R: Responder> {
    broker: SnapshotBroker<F, T, R>,
    events: mpsc::UnboundedReceiver<BrokerEvent>,
}

impl<F: FrameSource, T: TimerService, R: Responder> BrokerDispatcher<F, T, R> {
    pub fn new(
        broker: SnapshotBroker<F, T, R>,
        events: mpsc::UnboundedReceiver<BrokerEvent>,
    ) -> Self {
        Self { broker, events }
    }

    /// The broker being driven.
    pub fn broker(&self) -> &SnapshotBroker<F, T, R> {
        &self.broker
    }

    /// Route one event to its broker handler.
    pub fn dispatch(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::GetStill {
                request_id,
                timeout_secs,
            } => self.broker.on_get_still_request(request_id, timeout_secs),
            BrokerEvent::FrameReceived { request_id, frame } => {
                self.broker.on_frame_received(request_id, frame)
            }
            BrokerEvent::TimerFired { request_id } => self.broker.on_timeout(request_id),
        }
    }

    /// Drain events until `shutdown` turns true (or its sender is dropped),
    /// or every `EventSink` is gone. A request still pending at that point is
    /// answered with the shutdown failure.
    ///
    /// Returns the broker for inspection.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SnapshotBroker<F, T, R> {
        info!(topic = %self.broker.config().image_topic, "Snapshot broker dispatcher started");

        if !*shutdown.borrow_and_update() {
            loop {
                tokio::select! {
                    biased;

                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("Shutdown signalled");
                            break;
                        }
                    }
                    event = self.events.recv() => match event {
                        Some(event) => self.dispatch(event),
                        None => {
                            debug!("All event sinks dropped");
                            break;
                        }
                    },
                }
            }
        }

        self.broker.shutdown();
        info!("Snapshot broker dispatcher stopped");
        self.broker
    }
}
