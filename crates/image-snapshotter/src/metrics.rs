//! Metrics hooks for the snapshot broker
//!
//! The broker reports every outcome through a `MetricsRecorder`. The
//! in-crate `Metrics` keeps atomic counters for tests and embedding; the
//! runtime bridges the same trait to Prometheus.
//!
//! ## Usage
//!
//! ```ignore
//! use image_snapshotter::metrics::Metrics;
//! use std::sync::Arc;
//!
//! let metrics = Arc::new(Metrics::new());
//! let broker = SnapshotBroker::new(config, frames, timers, responder)
//!     .with_metrics(metrics.clone());
//! // ...
//! assert_eq!(metrics.snapshot().captured, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Why a request was answered without being admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Another request was in flight.
    Busy,
    /// The timeout could not be turned into a wait.
    InvalidTimeout,
    /// The frame stream could not be opened.
    SubscribeFailed,
}

impl Rejection {
    /// Label used by metrics backends.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Busy => "rejected",
            Self::InvalidTimeout => "invalid",
            Self::SubscribeFailed => "subscribe_failed",
        }
    }
}

/// Which kind of event arrived after its request had been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleKind {
    Frame,
    Timeout,
}

impl StaleKind {
    /// Label used by metrics backends.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Frame => "frame",
            Self::Timeout => "timeout",
        }
    }
}

/// Trait for custom metrics recording implementations
///
/// Implement this trait to integrate with external metrics systems
/// like Prometheus.
pub trait MetricsRecorder: Send + Sync {
    /// A request was admitted and is now awaiting a frame.
    fn record_admitted(&self);

    /// A request was answered immediately with a failure.
    fn record_rejected(&self, rejection: Rejection);

    /// A pending request resolved with a frame.
    fn record_captured(&self, latency: Duration, bytes: usize);

    /// A pending request resolved by its timer.
    fn record_timed_out(&self);

    /// A pending request was failed by shutdown.
    fn record_abandoned(&self);

    /// An event found nothing to resolve.
    fn record_stale(&self, kind: StaleKind);
}

/// Metrics collector for broker operations
///
/// Thread-safe counters for monitoring request outcomes.
#[derive(Default)]
pub struct Metrics {
    /// Requests admitted
    pub admitted: AtomicU64,
    /// Requests rejected because another was in flight
    pub rejected_busy: AtomicU64,
    /// Requests rejected for an unusable timeout
    pub rejected_invalid: AtomicU64,
    /// Requests failed because the stream could not be opened
    pub subscribe_failures: AtomicU64,
    /// Requests answered with a frame
    pub captured: AtomicU64,
    /// Requests answered with the timeout failure
    pub timed_out: AtomicU64,
    /// Requests failed by shutdown
    pub abandoned: AtomicU64,
    /// Frames that arrived with nothing to resolve
    pub stale_frames: AtomicU64,
    /// Timer firings that arrived with nothing to resolve
    pub stale_timeouts: AtomicU64,
    /// Cumulative admission-to-capture time in nanoseconds
    pub capture_time_ns: AtomicU64,
    /// Cumulative size of captured stills
    pub captured_bytes: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests admitted but not yet resolved.
    pub fn in_flight(&self) -> u64 {
        let admitted = self.admitted.load(Ordering::Relaxed);
        let resolved = self.captured.load(Ordering::Relaxed)
            + self.timed_out.load(Ordering::Relaxed)
            + self.abandoned.load(Ordering::Relaxed);
        admitted.saturating_sub(resolved)
    }

    /// Average admission-to-capture time in nanoseconds
    pub fn avg_capture_time_ns(&self) -> u64 {
        let total = self.capture_time_ns.load(Ordering::Relaxed);
        let count = self.captured.load(Ordering::Relaxed);
        if count > 0 {
            total / count
        } else {
            0
        }
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected_busy: self.rejected_busy.load(Ordering::Relaxed),
            rejected_invalid: self.rejected_invalid.load(Ordering::Relaxed),
            subscribe_failures: self.subscribe_failures.load(Ordering::Relaxed),
            captured: self.captured.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            stale_frames: self.stale_frames.load(Ordering::Relaxed),
            stale_timeouts: self.stale_timeouts.load(Ordering::Relaxed),
            captured_bytes: self.captured_bytes.load(Ordering::Relaxed),
            avg_capture_ns: self.avg_capture_time_ns(),
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub admitted: u64,
    pub rejected_busy: u64,
    pub rejected_invalid: u64,
    pub subscribe_failures: u64,
    pub captured: u64,
    pub timed_out: u64,
    pub abandoned: u64,
    pub stale_frames: u64,
    pub stale_timeouts: u64,
    pub captured_bytes: u64,
    pub avg_capture_ns: u64,
}

impl MetricsRecorder for Metrics {
    fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rejected(&self, rejection: Rejection) {
        let counter = match rejection {
            Rejection::Busy => &self.rejected_busy,
            Rejection::InvalidTimeout => &self.rejected_invalid,
            Rejection::SubscribeFailed => &self.subscribe_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_captured(&self, latency: Duration, bytes: usize) {
        self.captured.fetch_add(1, Ordering::Relaxed);
        self.capture_time_ns
            .fetch_add(u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX), Ordering::Relaxed);
        self.captured_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    fn record_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    fn record_stale(&self, kind: StaleKind) {
        let counter = match kind {
            StaleKind::Frame => &self.stale_frames,
            StaleKind::Timeout => &self.stale_timeouts,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// No-op metrics recorder for when metrics are disabled
#[derive(Default)]
pub struct NoOpMetrics;

impl MetricsRecorder for NoOpMetrics {
    fn record_admitted(&self) {}
    fn record_rejected(&self, _: Rejection) {}
    fn record_captured(&self, _: Duration, _: usize) {}
    fn record_timed_out(&self) {}
    fn record_abandoned(&self) {}
    fn record_stale(&self, _: StaleKind) {}
}
