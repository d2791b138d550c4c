//! Snapshot Broker
//!
//! Bridges pull-style still requests onto a push-style frame stream. Owns
//! the broker state and the three entry points that move it.
//!
//! Entry points are synchronous and must be called one at a time (see
//! `BrokerDispatcher`). Each of them re-checks the state before acting, so a
//! frame or timeout that lost the race to resolve a request is a no-op.

use crate::domain::{reasons, BrokerConfig, BrokerState, PendingRequest, StaleEvent};
use crate::metrics::{MetricsRecorder, NoOpMetrics, Rejection, StaleKind};
use crate::ports::{FrameSource, Responder, TimerService};
use shared_types::entities::{CompressedImage, RequestId};
use shared_types::ipc::GetStillResponse;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Single-flight still capture over a frame stream.
///
/// Generic over its driven ports so tests can inject mocks.
pub struct SnapshotBroker<F: FrameSource, T: TimerService, R: Responder> {
    config: BrokerConfig,
    state: BrokerState<F::Subscription, T::Timer>,
    frames: F,
    timers: T,
    responder: R,
    metrics: Arc<dyn MetricsRecorder>,
}

impl<F: FrameSource, T: TimerService, R: Responder> SnapshotBroker<F, T, R> {
    /// Create an idle broker.
    pub fn new(config: BrokerConfig, frames: F, timers: T, responder: R) -> Self {
        Self {
            config,
            state: BrokerState::Idle,
            frames,
            timers,
            responder,
            metrics: Arc::new(NoOpMetrics),
        }
    }

    /// Report outcomes to `metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsRecorder>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Broker configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Whether no request is in flight.
    pub fn is_idle(&self) -> bool {
        self.state.is_idle()
    }

    /// Id of the in-flight request, if any.
    pub fn pending_request_id(&self) -> Option<RequestId> {
        self.state.pending_id()
    }

    /// Admit a still request, or answer it at once if it cannot be admitted.
    ///
    /// An admitted request gets no response here; it is answered later by
    /// `on_frame_received`, `on_timeout` or `shutdown`.
    pub fn on_get_still_request(&mut self, request_id: RequestId, timeout_secs: f64) {
        if let Some(pending) = self.state.pending_id() {
            warn!(
                request_id = %request_id,
                pending = %pending,
                "Rejecting still request, another is in flight"
            );
            self.reject(request_id, Rejection::Busy, reasons::BUSY.to_string());
            return;
        }

        let timeout = match self.config.resolve_timeout(timeout_secs) {
            Ok(timeout) => timeout,
            Err(e) => {
                warn!(request_id = %request_id, timeout_secs, "Rejecting still request: {e}");
                self.reject(request_id, Rejection::InvalidTimeout, e.to_string());
                return;
            }
        };

        let subscription = match self.frames.subscribe(&self.config.image_topic, request_id) {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Could not open frame stream");
                self.reject(request_id, Rejection::SubscribeFailed, e.to_string());
                return;
            }
        };
        let timer = self.timers.arm(timeout, request_id);

        let pending = PendingRequest::new(request_id, Instant::now(), timeout, subscription, timer);
        if let Err(pending) = self.state.admit(pending) {
            // Unreachable while the busy check above holds.
            self.release(pending);
            self.reject(request_id, Rejection::Busy, reasons::BUSY.to_string());
            return;
        }

        self.metrics.record_admitted();
        info!(
            request_id = %request_id,
            topic = %self.config.image_topic,
            timeout = ?timeout,
            "Still request admitted, waiting for a frame"
        );
    }

    /// Resolve the pending request with `frame` if it is `request_id`.
    pub fn on_frame_received(&mut self, request_id: RequestId, frame: CompressedImage) {
        let pending = match self.state.resolve(request_id) {
            Ok(pending) => pending,
            Err(stale) => {
                self.ignore_stale(StaleKind::Frame, request_id, stale);
                return;
            }
        };

        let latency = pending.admitted_at.elapsed();
        let bytes = frame.len();
        self.responder
            .respond(request_id, GetStillResponse::captured(frame));
        self.metrics.record_captured(latency, bytes);
        info!(
            request_id = %request_id,
            latency = ?latency,
            bytes,
            "Still captured"
        );

        self.release(pending);
    }

    /// Fail the pending request if it is `request_id`.
    pub fn on_timeout(&mut self, request_id: RequestId) {
        let pending = match self.state.resolve(request_id) {
            Ok(pending) => pending,
            Err(stale) => {
                self.ignore_stale(StaleKind::Timeout, request_id, stale);
                return;
            }
        };

        self.responder
            .respond(request_id, GetStillResponse::failed(reasons::TIMED_OUT));
        self.metrics.record_timed_out();
        warn!(request_id = %request_id, "Timed out waiting for an image");

        self.release(pending);
    }

    /// Fail whatever is pending and go idle. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        let Some(pending) = self.state.take() else {
            return;
        };
        let request_id = pending.request_id;

        self.responder
            .respond(request_id, GetStillResponse::failed(reasons::SHUTTING_DOWN));
        self.metrics.record_abandoned();
        info!(request_id = %request_id, "Abandoned pending still request on shutdown");

        self.release(pending);
    }

    fn reject(&self, request_id: RequestId, rejection: Rejection, reason: String) {
        self.metrics.record_rejected(rejection);
        self.responder
            .respond(request_id, GetStillResponse::failed(reason));
    }

    fn release(&self, pending: PendingRequest<F::Subscription, T::Timer>) {
        let PendingRequest {
            request_id,
            subscription,
            timer,
            ..
        } = pending;
        self.timers.cancel(timer);
        self.frames.unsubscribe(subscription);
        debug!(request_id = %request_id, "Released frame subscription and timer");
    }

    fn ignore_stale(&self, kind: StaleKind, request_id: RequestId, stale: StaleEvent) {
        self.metrics.record_stale(kind);
        match stale {
            StaleEvent::Idle => warn!(
                request_id = %request_id,
                kind = kind.as_str(),
                "Ignoring event, no request pending"
            ),
            StaleEvent::OtherRequest(pending) => warn!(
                request_id = %request_id,
                pending = %pending,
                kind = kind.as_str(),
                "Ignoring event for a request that is no longer pending"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DEFAULT_TIMEOUT;
    use crate::metrics::Metrics;
    use crate::ports::{MockFrameSource, MockResponder, MockTimerService};
    use shared_types::entities::FrameHeader;
    use std::time::Duration;

    type TestBroker = SnapshotBroker<MockFrameSource, MockTimerService, MockResponder>;

    struct Harness {
        broker: TestBroker,
        frames: MockFrameSource,
        timers: MockTimerService,
        responder: MockResponder,
        metrics: Arc<Metrics>,
    }

    fn harness() -> Harness {
        let frames = MockFrameSource::new();
        let timers = MockTimerService::new();
        let responder = MockResponder::new();
        let metrics = Arc::new(Metrics::new());
        let broker = SnapshotBroker::new(
            BrokerConfig::default(),
            frames.clone(),
            timers.clone(),
            responder.clone(),
        )
        .with_metrics(metrics.clone());
        Harness {
            broker,
            frames,
            timers,
            responder,
            metrics,
        }
    }

    fn frame(data: &[u8]) -> CompressedImage {
        let header = FrameHeader {
            frame_id: "camera".to_string(),
            ..FrameHeader::default()
        };
        CompressedImage::new(header, "jpeg", data.to_vec())
    }

    #[test]
    fn test_admit_opens_subscription_and_timer_without_responding() {
        let mut h = harness();
        let id = RequestId::new();

        h.broker.on_get_still_request(id, 2.0);

        assert_eq!(h.broker.pending_request_id(), Some(id));
        assert!(h.responder.sent().is_empty());
        let opened = h.frames.opened();
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].request_id, id);
        assert_eq!(opened[0].topic.as_str(), "image_raw/compressed");
        let armed = h.timers.armed();
        assert_eq!(armed.len(), 1);
        assert_eq!(armed[0].request_id, id);
        assert_eq!(armed[0].duration, Duration::from_secs(2));
    }

    #[test]
    fn test_frame_resolves_with_success() {
        let mut h = harness();
        let id = RequestId::new();
        h.broker.on_get_still_request(id, 2.0);

        h.broker.on_frame_received(id, frame(&[0xFF, 0xD8, 0xFF]));

        let sent = h.responder.sent_to(id);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].success);
        assert_eq!(sent[0].reason, None);
        let still = sent[0].still.clone().unwrap();
        assert_eq!(still.format, "jpeg");
        assert_eq!(still.header.frame_id, "camera");
        assert_eq!(&still.data[..], &[0xFF, 0xD8, 0xFF]);
        assert!(h.broker.is_idle());
    }

    #[test]
    fn test_frame_then_late_timeout_sends_one_response() {
        let mut h = harness();
        let id = RequestId::new();
        h.broker.on_get_still_request(id, 2.0);

        h.broker.on_frame_received(id, frame(b"a"));
        h.broker.on_timeout(id);

        assert_eq!(h.responder.sent().len(), 1);
        assert!(h.responder.sent_to(id)[0].success);
        assert_eq!(h.metrics.snapshot().stale_timeouts, 1);
    }

    #[test]
    fn test_timeout_resolves_with_failure() {
        let mut h = harness();
        let id = RequestId::new();
        h.broker.on_get_still_request(id, 1.0);

        h.broker.on_timeout(id);

        let sent = h.responder.sent_to(id);
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].success);
        assert_eq!(sent[0].reason.as_deref(), Some("timed out waiting for an image"));
        assert!(sent[0].still.is_none());
        assert!(h.broker.is_idle());
    }

    #[test]
    fn test_timeout_then_late_frame_sends_one_response() {
        let mut h = harness();
        let id = RequestId::new();
        h.broker.on_get_still_request(id, 1.0);

        h.broker.on_timeout(id);
        h.broker.on_frame_received(id, frame(b"late"));
        h.broker.on_frame_received(id, frame(b"later"));

        assert_eq!(h.responder.sent().len(), 1);
        assert!(!h.responder.sent_to(id)[0].success);
        assert_eq!(h.metrics.snapshot().stale_frames, 2);
    }

    #[test]
    fn test_overlapping_request_is_rejected_and_pending_untouched() {
        let mut h = harness();
        let first = RequestId::new();
        let second = RequestId::new();
        h.broker.on_get_still_request(first, 2.0);

        h.broker.on_get_still_request(second, 2.0);

        let rejected = h.responder.sent_to(second);
        assert_eq!(rejected.len(), 1);
        assert_eq!(
            rejected[0].reason.as_deref(),
            Some("previous request still being processed")
        );
        assert!(h.responder.sent_to(first).is_empty());
        assert_eq!(h.broker.pending_request_id(), Some(first));
        assert_eq!(h.frames.opened().len(), 1);
        assert_eq!(h.timers.armed().len(), 1);

        h.broker.on_frame_received(first, frame(b"ok"));
        assert!(h.responder.sent_to(first)[0].success);
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let mut h = harness();
        h.broker.on_get_still_request(RequestId::new(), 0.0);
        assert_eq!(h.timers.armed()[0].duration, DEFAULT_TIMEOUT);

        let mut explicit = harness();
        explicit.broker.on_get_still_request(RequestId::new(), 2.0);
        assert_eq!(explicit.timers.armed()[0].duration, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_resources_released_after_frame() {
        let mut h = harness();
        let id = RequestId::new();
        h.broker.on_get_still_request(id, 2.0);
        h.broker.on_frame_received(id, frame(b"x"));

        assert_eq!(h.frames.live(), 0);
        assert_eq!(h.timers.live(), 0);
        assert_eq!(h.frames.released()[0].request_id, id);
        assert_eq!(h.timers.cancelled()[0].request_id, id);
    }

    #[test]
    fn test_resources_released_after_timeout() {
        let mut h = harness();
        let id = RequestId::new();
        h.broker.on_get_still_request(id, 2.0);
        h.broker.on_timeout(id);

        assert_eq!(h.frames.live(), 0);
        assert_eq!(h.timers.live(), 0);
    }

    #[test]
    fn test_next_request_opens_fresh_subscription() {
        let mut h = harness();
        let first = RequestId::new();
        h.broker.on_get_still_request(first, 2.0);
        h.broker.on_timeout(first);

        let second = RequestId::new();
        h.broker.on_get_still_request(second, 2.0);

        let opened = h.frames.opened();
        assert_eq!(opened.len(), 2);
        assert_ne!(opened[0].id, opened[1].id);
        assert_eq!(opened[1].request_id, second);
        assert_eq!(h.frames.live(), 1);
        assert_eq!(h.timers.live(), 1);
    }

    #[test]
    fn test_stale_timer_does_not_resolve_newer_request() {
        let mut h = harness();
        let first = RequestId::new();
        h.broker.on_get_still_request(first, 2.0);
        h.broker.on_frame_received(first, frame(b"x"));

        let second = RequestId::new();
        h.broker.on_get_still_request(second, 2.0);
        h.broker.on_timeout(first);

        assert_eq!(h.broker.pending_request_id(), Some(second));
        assert!(h.responder.sent_to(second).is_empty());
        assert_eq!(h.metrics.snapshot().stale_timeouts, 1);
    }

    #[test]
    fn test_events_while_idle_are_ignored() {
        let mut h = harness();
        h.broker.on_frame_received(RequestId::new(), frame(b"x"));
        h.broker.on_timeout(RequestId::new());

        assert!(h.responder.sent().is_empty());
        assert!(h.broker.is_idle());
        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.stale_frames, 1);
        assert_eq!(snapshot.stale_timeouts, 1);
    }

    #[test]
    fn test_invalid_timeout_rejected_without_resources() {
        let mut h = harness();
        let id = RequestId::new();
        h.broker.on_get_still_request(id, -1.0);

        let sent = h.responder.sent_to(id);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].reason.as_deref(), Some("invalid timeout: -1"));
        assert!(h.broker.is_idle());
        assert!(h.frames.opened().is_empty());
        assert!(h.timers.armed().is_empty());
        assert_eq!(h.metrics.snapshot().rejected_invalid, 1);
    }

    #[test]
    fn test_huge_timeout_rejected_and_next_request_served() {
        let mut h = harness();
        let id = RequestId::new();
        h.broker.on_get_still_request(id, 1.0e19);

        let sent = h.responder.sent_to(id);
        assert_eq!(sent.len(), 1);
        assert!(!sent[0].success);
        assert!(sent[0]
            .reason
            .as_deref()
            .is_some_and(|reason| reason.starts_with("invalid timeout")));
        assert!(h.broker.is_idle());
        assert!(h.frames.opened().is_empty());
        assert!(h.timers.armed().is_empty());

        let next = RequestId::new();
        h.broker.on_get_still_request(next, 1.0);
        h.broker.on_frame_received(next, frame(&[1]));
        assert!(h.responder.sent_to(next)[0].success);
    }

    #[test]
    fn test_subscribe_failure_leaves_broker_idle() {
        let mut h = harness();
        h.frames.fail_with("transport down");
        let id = RequestId::new();

        h.broker.on_get_still_request(id, 1.0);

        let sent = h.responder.sent_to(id);
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent[0].reason.as_deref(),
            Some("failed to subscribe to image_raw/compressed: transport down")
        );
        assert!(h.broker.is_idle());
        assert!(h.timers.armed().is_empty());
        assert_eq!(h.metrics.snapshot().subscribe_failures, 1);
    }

    #[test]
    fn test_shutdown_answers_pending_request() {
        let mut h = harness();
        let id = RequestId::new();
        h.broker.on_get_still_request(id, 2.0);

        h.broker.shutdown();
        h.broker.shutdown();

        let sent = h.responder.sent_to(id);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].reason.as_deref(), Some("shutting down"));
        assert_eq!(h.frames.live(), 0);
        assert_eq!(h.timers.live(), 0);
        assert_eq!(h.metrics.snapshot().abandoned, 1);
    }

    #[test]
    fn test_exactly_one_response_per_request_across_interleavings() {
        // F = frame, T = timeout, for the pending request
        let orders: [&[char]; 6] = [
            &['F'],
            &['T'],
            &['F', 'T'],
            &['T', 'F'],
            &['F', 'F', 'T'],
            &['T', 'T', 'F'],
        ];
        for order in orders {
            let mut h = harness();
            let id = RequestId::new();
            h.broker.on_get_still_request(id, 2.0);
            for event in order {
                match *event {
                    'F' => h.broker.on_frame_received(id, frame(b"x")),
                    _ => h.broker.on_timeout(id),
                }
            }
            assert_eq!(h.responder.sent_to(id).len(), 1, "order {order:?}");
            assert!(h.broker.is_idle());
            assert_eq!(h.frames.live(), 0);
            assert_eq!(h.timers.live(), 0);
        }
    }

    #[test]
    fn test_metrics_follow_outcomes() {
        let mut h = harness();
        let a = RequestId::new();
        h.broker.on_get_still_request(a, 2.0);
        h.broker.on_get_still_request(RequestId::new(), 2.0);
        h.broker.on_frame_received(a, frame(&[0; 16]));

        let b = RequestId::new();
        h.broker.on_get_still_request(b, 1.0);
        h.broker.on_timeout(b);

        let snapshot = h.metrics.snapshot();
        assert_eq!(snapshot.admitted, 2);
        assert_eq!(snapshot.rejected_busy, 1);
        assert_eq!(snapshot.captured, 1);
        assert_eq!(snapshot.captured_bytes, 16);
        assert_eq!(snapshot.timed_out, 1);
        assert_eq!(h.metrics.in_flight(), 0);
    }
}
