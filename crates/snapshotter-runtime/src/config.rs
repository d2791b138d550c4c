//! # Runtime Configuration
//!
//! Defaults for every runtime parameter, overridable from the environment.
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SNAP_IMAGE_TOPIC` | `image_raw/compressed` | Stream stills are taken from |
//! | `SNAP_DEFAULT_TIMEOUT_SECS` | `2.0` | Wait used for requests with timeout `0` |
//! | `SNAP_SERVICE_TOPIC` | `get_still` | Service topic requests arrive on |
//! | `SNAP_PRODUCER_POLL_SECS` | `1.0` | Poll interval while waiting for a producer |
//! | `SNAP_SYNTHETIC_CAMERA` | `true` | Publish synthetic frames in-process |
//! | `SNAP_CAMERA_FPS` | `10` | Synthetic camera frame rate |
//! | `SNAP_CAMERA_FRAME_ID` | `camera` | `frame_id` stamped on synthetic frames |
//! | `SNAP_PROBE_INTERVAL_SECS` | `5.0` | Self-test request interval, `0` disables |
//! | `SNAP_BUS_CAPACITY` | `64` | Events buffered per bus subscriber |

use image_snapshotter::{BrokerConfig, DEFAULT_SERVICE_TOPIC};
use shared_bus::{Topic, DEFAULT_CHANNEL_CAPACITY};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Complete runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Broker configuration.
    pub broker: BrokerConfig,
    /// Service topic of `get_still`.
    pub service_topic: Topic,
    /// Poll interval while waiting for a stream producer.
    pub producer_poll_interval: Duration,
    /// In-process frame producer.
    pub camera: SyntheticCameraConfig,
    /// Interval of the self-test probe, `None` when disabled.
    pub probe_interval: Option<Duration>,
    /// Bus channel capacity.
    pub bus_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            service_topic: Topic::new(DEFAULT_SERVICE_TOPIC),
            producer_poll_interval: Duration::from_secs(1),
            camera: SyntheticCameraConfig::default(),
            probe_interval: Some(Duration::from_secs(5)),
            bus_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Synthetic camera configuration.
#[derive(Debug, Clone)]
pub struct SyntheticCameraConfig {
    /// Whether the camera runs.
    pub enabled: bool,
    /// Frames per second.
    pub fps: u32,
    /// `frame_id` written into frame headers.
    pub frame_id: String,
    /// Compression format tag.
    pub format: String,
    /// Size of each frame payload in bytes.
    pub payload_bytes: usize,
}

impl Default for SyntheticCameraConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fps: 10,
            frame_id: "camera".to_string(),
            format: "jpeg".to_string(),
            payload_bytes: 16 * 1024,
        }
    }
}

impl SyntheticCameraConfig {
    /// Time between two frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

/// Load configuration from the process environment.
pub fn load_config() -> RuntimeConfig {
    load_config_from(|key| std::env::var(key).ok())
}

/// Load configuration from an arbitrary variable lookup.
///
/// Unparseable values are logged and the default kept.
pub fn load_config_from(lookup: impl Fn(&str) -> Option<String>) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();

    if let Some(topic) = lookup("SNAP_IMAGE_TOPIC") {
        config.broker.image_topic = Topic::new(topic);
    }
    if let Some(secs) = parse_var::<f64>(&lookup, "SNAP_DEFAULT_TIMEOUT_SECS") {
        match Duration::try_from_secs_f64(secs) {
            Ok(timeout) if !timeout.is_zero() => config.broker.default_timeout = timeout,
            _ => warn!(value = secs, "SNAP_DEFAULT_TIMEOUT_SECS must be positive, keeping default"),
        }
    }
    if let Some(topic) = lookup("SNAP_SERVICE_TOPIC") {
        config.service_topic = Topic::new(topic);
    }
    if let Some(secs) = parse_var::<f64>(&lookup, "SNAP_PRODUCER_POLL_SECS") {
        match Duration::try_from_secs_f64(secs) {
            Ok(interval) if !interval.is_zero() => config.producer_poll_interval = interval,
            _ => warn!(value = secs, "SNAP_PRODUCER_POLL_SECS must be positive, keeping default"),
        }
    }
    if let Some(enabled) = parse_var::<bool>(&lookup, "SNAP_SYNTHETIC_CAMERA") {
        config.camera.enabled = enabled;
    }
    if let Some(fps) = parse_var::<u32>(&lookup, "SNAP_CAMERA_FPS") {
        if fps > 0 {
            config.camera.fps = fps;
        } else {
            warn!("SNAP_CAMERA_FPS must be positive, keeping default");
        }
    }
    if let Some(frame_id) = lookup("SNAP_CAMERA_FRAME_ID") {
        config.camera.frame_id = frame_id;
    }
    if let Some(secs) = parse_var::<f64>(&lookup, "SNAP_PROBE_INTERVAL_SECS") {
        match Duration::try_from_secs_f64(secs) {
            Ok(interval) if interval.is_zero() => config.probe_interval = None,
            Ok(interval) => config.probe_interval = Some(interval),
            Err(_) => warn!(value = secs, "SNAP_PROBE_INTERVAL_SECS is invalid, keeping default"),
        }
    }
    if let Some(capacity) = parse_var::<usize>(&lookup, "SNAP_BUS_CAPACITY") {
        if capacity > 0 {
            config.bus_capacity = capacity;
        } else {
            warn!("SNAP_BUS_CAPACITY must be positive, keeping default");
        }
    }

    config
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparseable environment variable");
            None
        }
    }
}
