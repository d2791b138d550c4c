//! # Image Snapshotter
//!
//! Serves the `get_still` service: each request returns the next frame
//! published on the image topic, or a failure once its timeout elapses.
//! Only one request is handled at a time.
//!
//! ## Startup Sequence
//!
//! 1. Initialize telemetry (logs and Prometheus metrics)
//! 2. Load configuration from the environment
//! 3. Run until Ctrl+C

use anyhow::{Context, Result};
use snapshot_telemetry::{encode_metrics, init_telemetry, TelemetryConfig};
use snapshotter_runtime::{load_config, SnapshotterRuntime};
use tracing::{debug, error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry =
        init_telemetry(TelemetryConfig::from_env()).context("Failed to initialize telemetry")?;

    let config = load_config();
    let runtime = SnapshotterRuntime::new(config);

    let shutdown = runtime.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received");
                shutdown.signal();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    runtime.run().await?;

    match encode_metrics() {
        Ok(metrics) => debug!("Final metrics:\n{metrics}"),
        Err(e) => error!(error = %e, "Failed to encode metrics"),
    }
    Ok(())
}
