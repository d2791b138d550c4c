//! Prometheus metrics for the snapshotter.
//!
//! All metrics follow the naming convention: `snap_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., still_requests_total)
//! - **Gauge**: Value that can go up or down (e.g., requests_in_flight)
//! - **Histogram**: Distribution of values (e.g., capture_latency_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, Opts, Registry,
    TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // BROKER METRICS
    // =========================================================================

    /// Still requests by final outcome
    pub static ref STILL_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("snap_broker_still_requests_total", "Still requests by outcome"),
        &["outcome"]  // outcome: success/timeout/rejected/invalid/subscribe_failed/shutdown
    ).expect("metric creation failed");

    /// Frame or timer events that arrived after their request was resolved
    pub static ref STALE_EVENTS: CounterVec = CounterVec::new(
        Opts::new("snap_broker_stale_events_total", "Events ignored because their request was already resolved"),
        &["kind"]  // kind: frame/timeout
    ).expect("metric creation failed");

    /// Requests currently awaiting a frame (0 or 1)
    pub static ref REQUESTS_IN_FLIGHT: Gauge = Gauge::new(
        "snap_broker_requests_in_flight",
        "Still requests currently awaiting a frame"
    ).expect("metric creation failed");

    /// Time from admission to captured frame
    pub static ref CAPTURE_LATENCY: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "snap_broker_capture_latency_seconds",
            "Time from request admission to frame capture"
        ).buckets(exponential_buckets(0.001, 2.0, 14).expect("valid buckets"))
    ).expect("metric creation failed");

    /// Size of captured stills
    pub static ref STILL_BYTES: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "snap_broker_still_size_bytes",
            "Encoded size of captured stills"
        ).buckets(exponential_buckets(1024.0, 2.0, 14).expect("valid buckets"))
    ).expect("metric creation failed");

    // =========================================================================
    // STREAM METRICS
    // =========================================================================

    /// Frames published by in-process producers
    pub static ref FRAMES_PUBLISHED: Counter = Counter::new(
        "snap_stream_frames_published_total",
        "Frames published on image topics"
    ).expect("metric creation failed");
}

/// Handle proving metrics were registered.
pub struct MetricsHandle {
    _registered: usize,
}

/// Register all metrics with the global registry.
///
/// Registering twice is harmless: already-registered collectors are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Broker
        Box::new(STILL_REQUESTS.clone()),
        Box::new(STALE_EVENTS.clone()),
        Box::new(REQUESTS_IN_FLIGHT.clone()),
        Box::new(CAPTURE_LATENCY.clone()),
        Box::new(STILL_BYTES.clone()),
        // Stream
        Box::new(FRAMES_PUBLISHED.clone()),
    ];

    let mut registered = 0;
    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) => registered += 1,
            Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registered: registered,
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
