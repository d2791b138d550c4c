//! # Snapshotter Runtime Library
//!
//! Exposes the runtime's modules for testing. The entry point is the
//! `main.rs` binary.
//!
//! - `config` - environment-driven runtime configuration
//! - `camera` - in-process synthetic frame producer
//! - `metrics` - Prometheus bridge for broker metrics
//! - `runtime` - task wiring, readiness wait and graceful shutdown

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod camera;
pub mod config;
pub mod metrics;
pub mod runtime;

pub use camera::SyntheticCamera;
pub use config::{load_config, load_config_from, RuntimeConfig, SyntheticCameraConfig};
pub use metrics::PrometheusMetrics;
pub use runtime::{probe_once, ShutdownHandle, SnapshotterRuntime};
