//! # Snapshot Telemetry
//!
//! Logging and metrics for the image snapshotter.
//!
//! ## Components
//!
//! - **Logs**: `tracing` with an `EnvFilter`, pretty or JSON output
//! - **Metrics**: Prometheus counters, gauges and histograms in a private registry
//!
//! ## Usage
//!
//! ```rust,ignore
//! use snapshot_telemetry::{TelemetryConfig, init_telemetry};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env())?;
//!     // Logs and metrics are now being collected
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `image-snapshotter` | Service name in logs |
//! | `SNAP_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `SNAP_JSON_LOGS` | `false` (`true` in containers) | JSON log output |
//! | `SNAP_CONSOLE_OUTPUT` | `true` | Emit logs at all |
//! | `SNAP_METRICS_ENABLED` | `true` | Register Prometheus metrics |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::StructuredLogger;
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, CAPTURE_LATENCY, FRAMES_PUBLISHED,
    REQUESTS_IN_FLIGHT, STALE_EVENTS, STILL_BYTES, STILL_REQUESTS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first so early log lines can already count
    let metrics = if config.metrics_enabled {
        Some(register_metrics()?)
    } else {
        None
    };

    let logger = logging::init_logging(&config)?;

    Ok(TelemetryGuard {
        _logger: logger,
        _metrics: metrics,
        service_name: config.service_name,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _logger: StructuredLogger,
    _metrics: Option<MetricsHandle>,
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = TelemetryError::MetricsInit("duplicate".to_string());
        assert_eq!(
            err.to_string(),
            "Failed to initialize Prometheus metrics: duplicate"
        );
    }
}
