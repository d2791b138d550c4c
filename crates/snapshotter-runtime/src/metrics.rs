//! Prometheus bridge for broker metrics.

use image_snapshotter::{MetricsRecorder, Rejection, StaleKind};
use snapshot_telemetry::{
    CAPTURE_LATENCY, REQUESTS_IN_FLIGHT, STALE_EVENTS, STILL_BYTES, STILL_REQUESTS,
};
use std::time::Duration;

/// `MetricsRecorder` writing to the global Prometheus registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrometheusMetrics;

impl PrometheusMetrics {
    fn resolved(outcome: &str) {
        STILL_REQUESTS.with_label_values(&[outcome]).inc();
        REQUESTS_IN_FLIGHT.dec();
    }
}

impl MetricsRecorder for PrometheusMetrics {
    fn record_admitted(&self) {
        REQUESTS_IN_FLIGHT.inc();
    }

    fn record_rejected(&self, rejection: Rejection) {
        STILL_REQUESTS.with_label_values(&[rejection.as_str()]).inc();
    }

    fn record_captured(&self, latency: Duration, bytes: usize) {
        Self::resolved("success");
        CAPTURE_LATENCY.observe(latency.as_secs_f64());
        STILL_BYTES.observe(bytes as f64);
    }

    fn record_timed_out(&self) {
        Self::resolved("timeout");
    }

    fn record_abandoned(&self) {
        Self::resolved("shutdown");
    }

    fn record_stale(&self, kind: StaleKind) {
        STALE_EVENTS.with_label_values(&[kind.as_str()]).inc();
    }
}
