//! # Snapshotter Runtime
//!
//! Wires the bus, the synthetic camera, the snapshot broker and the
//! `get_still` service together and runs them until shutdown.
//!
//! ## Startup Sequence
//!
//! 1. Start the synthetic camera (if enabled)
//! 2. Wait for a producer on the image topic
//! 3. Start the broker dispatcher and the `get_still` server
//! 4. Start the self-test probe (if enabled)
//! 5. Run until shutdown is signalled

use crate::camera::SyntheticCamera;
use crate::config::RuntimeConfig;
use crate::metrics::PrometheusMetrics;
use anyhow::{Context, Result};
use image_snapshotter::service::channel;
use image_snapshotter::{
    BrokerDispatcher, BusFrameSource, BusProducerMonitor, BusResponder, GetStillClient,
    GetStillServer, ProducerMonitor, SnapshotBroker, SnapshotError, TokioTimerService,
};
use shared_bus::InMemoryEventBus;
use shared_types::entities::RequestId;
use shared_types::ipc::GetStillRequest;
use snapshot_telemetry::log_request_event;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// How long background tasks get to stop after shutdown is signalled.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Signals the runtime to stop. Cheap to clone.
#[derive(Clone)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask every runtime task to stop.
    pub fn signal(&self) {
        self.sender.send_replace(true);
    }
}

/// The runtime orchestrating all snapshotter tasks.
pub struct SnapshotterRuntime {
    config: RuntimeConfig,
    bus: Arc<InMemoryEventBus>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SnapshotterRuntime {
    pub fn new(config: RuntimeConfig) -> Self {
        info!("Creating image snapshotter runtime");
        let bus = Arc::new(InMemoryEventBus::with_capacity(config.bus_capacity));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            config,
            bus,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The bus every component talks over.
    pub fn bus(&self) -> Arc<InMemoryEventBus> {
        Arc::clone(&self.bus)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            sender: Arc::clone(&self.shutdown_tx),
        }
    }

    /// A client for this runtime's `get_still` service.
    pub fn client(&self) -> GetStillClient {
        GetStillClient::new(
            self.bus(),
            self.config.service_topic.clone(),
            self.config.broker.default_timeout,
        )
    }

    /// Start everything and run until shutdown is signalled.
    pub async fn run(&self) -> Result<()> {
        info!("===========================================");
        info!("  Image Snapshotter Runtime v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        let mut tasks = Vec::new();

        if self.config.camera.enabled {
            let camera = SyntheticCamera::new(
                &self.bus,
                self.config.broker.image_topic.clone(),
                self.config.camera.clone(),
            );
            tasks.push(camera.spawn(self.shutdown_rx.clone()));
        }

        let monitor = BusProducerMonitor::new(self.bus())
            .with_poll_interval(self.config.producer_poll_interval);
        match monitor
            .wait_for_producer(&self.config.broker.image_topic, self.shutdown_rx.clone())
            .await
        {
            Ok(()) => {}
            Err(SnapshotError::Interrupted { .. }) => {
                info!("Shutdown requested before a producer appeared");
                join_tasks(tasks).await;
                return Ok(());
            }
            Err(e) => return Err(e).context("Failed waiting for an image producer"),
        }

        tasks.extend(self.start_broker());

        if let Some(interval) = self.config.probe_interval {
            tasks.push(self.spawn_probe(interval));
        }

        info!(
            service = %self.config.service_topic,
            topic = %self.config.broker.image_topic,
            "Snapshotter is running. Press Ctrl+C to stop."
        );

        self.wait_for_shutdown().await;
        info!("Initiating graceful shutdown...");
        join_tasks(tasks).await;
        info!("Shutdown complete");
        Ok(())
    }

    fn start_broker(&self) -> Vec<JoinHandle<()>> {
        let (sink, events) = channel();
        let service = self.config.service_topic.clone();

        let broker = SnapshotBroker::new(
            self.config.broker.clone(),
            BusFrameSource::new(self.bus(), sink.clone()),
            TokioTimerService::new(sink.clone()),
            BusResponder::new(self.bus(), service.clone()),
        )
        .with_metrics(Arc::new(PrometheusMetrics));
        let dispatcher = BrokerDispatcher::new(broker, events);
        let server = GetStillServer::bind(&self.bus, service, sink);

        let server_shutdown = self.shutdown_rx.clone();
        let dispatcher_shutdown = self.shutdown_rx.clone();
        vec![
            tokio::spawn(server.run(server_shutdown)),
            tokio::spawn(async move {
                dispatcher.run(dispatcher_shutdown).await;
            }),
        ]
    }

    fn spawn_probe(&self, interval: Duration) -> JoinHandle<()> {
        let client = self.client();
        let mut shutdown = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        probe_once(&client).await;
                    }
                }
            }
        })
    }

    async fn wait_for_shutdown(&self) {
        let mut shutdown = self.shutdown_rx.clone();
        while !*shutdown.borrow_and_update() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Issue one default still request and log the outcome.
///
/// Returns the size of the captured still.
pub async fn probe_once(client: &GetStillClient) -> Option<usize> {
    let request_id = RequestId::new();
    match client.call(request_id, GetStillRequest::default()).await {
        Ok(response) => match response.into_result() {
            Ok(still) => {
                log_request_event!(
                    info,
                    request_id,
                    "Probe captured a still",
                    bytes = still.len(),
                    format = %still.format
                );
                Some(still.len())
            }
            Err(reason) => {
                log_request_event!(warn, request_id, "Probe failed", reason = %reason);
                None
            }
        },
        Err(e) => {
            log_request_event!(error, request_id, "Probe got no response", error = %e);
            None
        }
    }
}

async fn join_tasks(tasks: Vec<JoinHandle<()>>) {
    match tokio::time::timeout(SHUTDOWN_GRACE, futures::future::join_all(tasks)).await {
        Ok(results) => {
            for result in results {
                if let Err(e) = result {
                    error!(error = %e, "Task failed during shutdown");
                }
            }
        }
        Err(_) => warn!("Tasks did not stop within {:?}", SHUTDOWN_GRACE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyntheticCameraConfig;
    use shared_bus::Topic;

    fn config(camera_enabled: bool) -> RuntimeConfig {
        RuntimeConfig {
            camera: SyntheticCameraConfig {
                enabled: camera_enabled,
                fps: 20,
                payload_bytes: 256,
                ..SyntheticCameraConfig::default()
            },
            probe_interval: None,
            ..RuntimeConfig::default()
        }
    }

    async fn wait_for_service(runtime: &SnapshotterRuntime) {
        let service = runtime.config().service_topic.clone();
        for _ in 0..200 {
            if runtime.bus().topic_subscriber_count(&service) > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("get_still service never came up");
    }

    #[tokio::test(start_paused = true)]
    async fn test_serves_stills_from_synthetic_camera() {
        let runtime = Arc::new(SnapshotterRuntime::new(config(true)));
        let shutdown = runtime.shutdown_handle();
        let task = tokio::spawn({
            let runtime = Arc::clone(&runtime);
            async move { runtime.run().await }
        });

        wait_for_service(&runtime).await;
        let bytes = probe_once(&runtime.client()).await;
        assert_eq!(bytes, Some(256));

        shutdown.signal();
        task.await.unwrap().unwrap();
        assert_eq!(
            runtime.bus().publisher_count(&Topic::new("image_raw/compressed")),
            0
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_waiting_for_producer() {
        let runtime = Arc::new(SnapshotterRuntime::new(config(false)));
        let shutdown = runtime.shutdown_handle();
        let task = tokio::spawn({
            let runtime = Arc::clone(&runtime);
            async move { runtime.run().await }
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!task.is_finished());

        shutdown.signal();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_producer_is_accepted() {
        let runtime = Arc::new(SnapshotterRuntime::new(config(false)));
        let shutdown = runtime.shutdown_handle();
        let task = tokio::spawn({
            let runtime = Arc::clone(&runtime);
            async move { runtime.run().await }
        });

        let bus = runtime.bus();
        let mut camera = SyntheticCamera::new(
            &bus,
            Topic::new("image_raw/compressed"),
            SyntheticCameraConfig::default(),
        );
        wait_for_service(&runtime).await;

        let client = runtime.client();
        let call = tokio::spawn(async move { probe_once(&client).await });
        for _ in 0..200 {
            if bus.topic_subscriber_count(&Topic::new("image_raw/compressed")) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        camera.capture();
        assert!(call.await.unwrap().is_some());

        shutdown.signal();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_reports_timeout_without_frames() {
        let runtime = Arc::new(SnapshotterRuntime::new(config(false)));
        let shutdown = runtime.shutdown_handle();
        let bus = runtime.bus();
        let _silent = bus.advertise("image_raw/compressed");
        let task = tokio::spawn({
            let runtime = Arc::clone(&runtime);
            async move { runtime.run().await }
        });

        wait_for_service(&runtime).await;
        assert_eq!(probe_once(&runtime.client()).await, None);

        shutdown.signal();
        task.await.unwrap().unwrap();
    }
}
