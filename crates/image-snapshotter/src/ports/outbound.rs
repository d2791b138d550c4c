//! Outbound (Driven) ports for the snapshotter.
//!
//! These traits define the collaborators the broker drives: the frame
//! stream, the timeout timer, the response channel back to callers, and
//! producer readiness at startup.
//!
//! Handles returned by `FrameSource` and `TimerService` are owned by the
//! broker's pending request and handed back exactly once for release.

use crate::error::SnapshotError;
use async_trait::async_trait;
use shared_bus::Topic;
use shared_types::entities::RequestId;
use shared_types::ipc::GetStillResponse;
use std::time::Duration;
use tokio::sync::watch;

/// Stream transport: transient frame subscriptions.
pub trait FrameSource: Send + Sync {
    /// Live subscription; frames are delivered tagged with its request id.
    type Subscription: Send;

    /// Start delivering frames from `topic` for `request_id`.
    ///
    /// Must not block. Frames published after this returns are delivered.
    fn subscribe(
        &self,
        topic: &Topic,
        request_id: RequestId,
    ) -> Result<Self::Subscription, SnapshotError>;

    /// Stop delivering frames. Frames already in flight may still arrive.
    fn unsubscribe(&self, subscription: Self::Subscription);
}

/// Timer collaborator: one-shot timeouts.
pub trait TimerService: Send + Sync {
    /// Armed timer; fires once, tagged with its request id.
    type Timer: Send;

    /// Fire a timeout for `request_id` after `duration`.
    fn arm(&self, duration: Duration, request_id: RequestId) -> Self::Timer;

    /// Best-effort cancel. A firing already in flight may still arrive.
    fn cancel(&self, timer: Self::Timer);
}

/// Response channel back to the caller that issued a request.
pub trait Responder: Send + Sync {
    /// Deliver the single response for `request_id`.
    fn respond(&self, request_id: RequestId, response: GetStillResponse);
}

/// Startup readiness: waits until somebody publishes the image stream.
#[async_trait]
pub trait ProducerMonitor: Send + Sync {
    /// Resolve once at least one producer exists on `topic`.
    ///
    /// # Errors
    /// - `Interrupted`: shutdown was signalled first
    async fn wait_for_producer(
        &self,
        topic: &Topic,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), SnapshotError>;
}

/// Subscription handle issued by `MockFrameSource`.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSubscription {
    pub id: u64,
    pub topic: Topic,
    pub request_id: RequestId,
}

/// Timer handle issued by `MockTimerService`.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTimer {
    pub id: u64,
    pub duration: Duration,
    pub request_id: RequestId,
}

#[cfg(test)]
#[derive(Default)]
struct MockFrameSourceState {
    next_id: u64,
    opened: Vec<MockSubscription>,
    released: Vec<MockSubscription>,
    fail_with: Option<String>,
}

/// Mock frame source for testing. Clones share state.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockFrameSource {
    state: std::sync::Arc<parking_lot::Mutex<MockFrameSourceState>>,
}

#[cfg(test)]
impl MockFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `subscribe` fail with `reason`.
    pub fn fail_with(&self, reason: &str) {
        self.state.lock().fail_with = Some(reason.to_string());
    }

    pub fn opened(&self) -> Vec<MockSubscription> {
        self.state.lock().opened.clone()
    }

    pub fn released(&self) -> Vec<MockSubscription> {
        self.state.lock().released.clone()
    }

    /// Subscriptions opened and not yet released.
    pub fn live(&self) -> usize {
        let state = self.state.lock();
        state.opened.len() - state.released.len()
    }
}

#[cfg(test)]
impl FrameSource for MockFrameSource {
    type Subscription = MockSubscription;

    fn subscribe(
        &self,
        topic: &Topic,
        request_id: RequestId,
    ) -> Result<MockSubscription, SnapshotError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.fail_with.clone() {
            return Err(SnapshotError::Subscribe {
                topic: topic.to_string(),
                reason,
            });
        }
        state.next_id += 1;
        let subscription = MockSubscription {
            id: state.next_id,
            topic: topic.clone(),
            request_id,
        };
        state.opened.push(subscription.clone());
        Ok(subscription)
    }

    fn unsubscribe(&self, subscription: MockSubscription) {
        self.state.lock().released.push(subscription);
    }
}

#[cfg(test)]
#[derive(Default)]
struct MockTimerState {
    next_id: u64,
    armed: Vec<MockTimer>,
    cancelled: Vec<MockTimer>,
}

/// Mock timer service for testing. Timers never fire on their own; tests
/// call `SnapshotBroker::on_timeout` directly. Clones share state.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockTimerService {
    state: std::sync::Arc<parking_lot::Mutex<MockTimerState>>,
}

#[cfg(test)]
impl MockTimerService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn armed(&self) -> Vec<MockTimer> {
        self.state.lock().armed.clone()
    }

    pub fn cancelled(&self) -> Vec<MockTimer> {
        self.state.lock().cancelled.clone()
    }

    /// Timers armed and not yet cancelled.
    pub fn live(&self) -> usize {
        let state = self.state.lock();
        state.armed.len() - state.cancelled.len()
    }
}

#[cfg(test)]
impl TimerService for MockTimerService {
    type Timer = MockTimer;

    fn arm(&self, duration: Duration, request_id: RequestId) -> MockTimer {
        let mut state = self.state.lock();
        state.next_id += 1;
        let timer = MockTimer {
            id: state.next_id,
            duration,
            request_id,
        };
        state.armed.push(timer.clone());
        timer
    }

    fn cancel(&self, timer: MockTimer) {
        self.state.lock().cancelled.push(timer);
    }
}

/// Mock responder recording every response in order. Clones share state.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockResponder {
    sent: std::sync::Arc<parking_lot::Mutex<Vec<(RequestId, GetStillResponse)>>>,
}

#[cfg(test)]
impl MockResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(RequestId, GetStillResponse)> {
        self.sent.lock().clone()
    }

    /// Responses delivered to `request_id`.
    pub fn sent_to(&self, request_id: RequestId) -> Vec<GetStillResponse> {
        self.sent
            .lock()
            .iter()
            .filter(|(id, _)| *id == request_id)
            .map(|(_, response)| response.clone())
            .collect()
    }
}

#[cfg(test)]
impl Responder for MockResponder {
    fn respond(&self, request_id: RequestId, response: GetStillResponse) {
        self.sent.lock().push((request_id, response));
    }
}
