//! Synthetic camera: an in-process frame producer.
//!
//! Stands in for a camera driver. Advertises the image topic and publishes
//! one compressed frame per tick until shutdown.

use crate::config::SyntheticCameraConfig;
use rand::RngCore;
use shared_bus::{InMemoryEventBus, PublisherHandle, Topic};
use shared_types::entities::{CompressedImage, FrameHeader, Timestamp};
use snapshot_telemetry::FRAMES_PUBLISHED;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// JPEG start-of-image marker.
const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];

/// Periodic frame publisher.
pub struct SyntheticCamera {
    publisher: PublisherHandle,
    config: SyntheticCameraConfig,
    sequence: u64,
}

impl SyntheticCamera {
    /// Advertise `topic` on `bus`. Producers waiting on the topic see it at once.
    pub fn new(bus: &Arc<InMemoryEventBus>, topic: Topic, config: SyntheticCameraConfig) -> Self {
        Self {
            publisher: bus.advertise(topic),
            config,
            sequence: 0,
        }
    }

    /// Build the next frame.
    pub fn next_frame(&mut self) -> CompressedImage {
        self.sequence += 1;
        let header = FrameHeader {
            stamp: Timestamp::now(),
            frame_id: self.config.frame_id.clone(),
        };
        CompressedImage::new(
            header,
            self.config.format.clone(),
            payload(self.sequence, self.config.payload_bytes),
        )
    }

    /// Publish one frame. Returns the number of subscribers reached.
    pub fn capture(&mut self) -> usize {
        let frame = self.next_frame();
        let receivers = self.publisher.publish(frame);
        FRAMES_PUBLISHED.inc();
        receivers
    }

    /// Publish frames at the configured rate until `shutdown` turns true.
    pub fn spawn(mut self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.frame_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                topic = %self.publisher.topic(),
                fps = self.config.fps,
                "Synthetic camera started"
            );

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let receivers = self.capture();
                        debug!(sequence = self.sequence, receivers, "Frame published");
                    }
                }
            }
            info!(frames = self.sequence, "Synthetic camera stopped");
        })
    }
}

/// Frame bytes: SOI marker, big-endian sequence number, random fill.
fn payload(sequence: u64, len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(len.max(10));
    data.extend_from_slice(&JPEG_SOI);
    data.extend_from_slice(&sequence.to_be_bytes());
    if len > data.len() {
        let start = data.len();
        data.resize(len, 0);
        rand::thread_rng().fill_bytes(&mut data[start..]);
    }
    data
}
