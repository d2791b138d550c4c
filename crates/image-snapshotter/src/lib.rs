//! # Image Snapshotter
//!
//! Serves one still image on request from a continuously published
//! compressed image stream, without ever blocking the stream producer.
//!
//! ## Purpose
//!
//! A caller asks for a still. The broker admits the request if none is in
//! flight, opens a transient subscription to the image stream, arms a
//! timeout, and answers with the first frame that arrives or with a timeout
//! failure, whichever comes first.
//!
//! ## Request Lifecycle
//!
//! ```text
//! [Idle] ──admit──→ [AwaitingFrame] ──first frame──→ respond success ──→ [Idle]
//!                          │
//!                          ├──timeout──→ respond "timed out waiting for an image" ──→ [Idle]
//!                          └──second request──→ rejected at once, state untouched
//! ```
//!
//! ## Domain Invariants
//!
//! | Invariant | Enforcement Location |
//! |-----------|---------------------|
//! | At most one request in flight | `domain/state.rs` - `BrokerState::admit()` |
//! | Subscription and timer live exactly as long as the pending request | `domain/state.rs` - owned by `PendingRequest` |
//! | Exactly one response per request | `service/broker.rs` - `BrokerState::resolve()` before responding |
//! | Late frames and timers are no-ops | `service/broker.rs` - request id check in `resolve()` |
//! | Handlers never run concurrently | `service/dispatcher.rs` - single consumer task |
//!
//! ## Outbound Dependencies
//!
//! | Collaborator | Trait | Purpose |
//! |--------------|-------|---------|
//! | Stream transport | `FrameSource` | Transient frame subscriptions |
//! | Timer | `TimerService` | One-shot timeouts |
//! | Service transport | `Responder` | Single response per request |
//! | Readiness | `ProducerMonitor` | Wait for a stream producer at startup |
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      OUTER LAYER                                │
//! │  adapters/ - shared-bus stream, service, readiness; tokio timer │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      MIDDLE LAYER                               │
//! │  ports/inbound.rs  - StillService trait                         │
//! │  ports/outbound.rs - FrameSource, TimerService, Responder,      │
//! │                      ProducerMonitor traits                     │
//! │  service/          - SnapshotBroker, BrokerDispatcher           │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      INNER LAYER                                │
//! │  domain/state.rs  - BrokerState, PendingRequest, reasons        │
//! │  domain/config.rs - BrokerConfig, timeout resolution            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let bus = Arc::new(InMemoryEventBus::new());
//! let (sink, events) = image_snapshotter::service::channel();
//! let broker = SnapshotBroker::new(
//!     BrokerConfig::default(),
//!     BusFrameSource::new(bus.clone(), sink.clone()),
//!     TokioTimerService::new(sink.clone()),
//!     BusResponder::new(bus.clone(), "get_still"),
//! );
//! tokio::spawn(BrokerDispatcher::new(broker, events).run(shutdown.clone()));
//! tokio::spawn(GetStillServer::bind(&bus, "get_still", sink).run(shutdown));
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-export main types
pub use adapters::{
    BusFrameSource, BusProducerMonitor, BusResponder, GetStillClient, GetStillServer,
    TokioTimerService,
};
pub use domain::{BrokerConfig, BrokerState, PendingRequest, DEFAULT_IMAGE_TOPIC, DEFAULT_SERVICE_TOPIC, DEFAULT_TIMEOUT};
pub use error::SnapshotError;
pub use metrics::{Metrics, MetricsRecorder, MetricsSnapshot, NoOpMetrics, Rejection, StaleKind};
pub use ports::{FrameSource, ProducerMonitor, Responder, StillService, TimerService};
pub use service::{BrokerDispatcher, BrokerEvent, EventSink, SnapshotBroker};
