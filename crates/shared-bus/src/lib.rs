//! # Shared Bus - In-Process Publish/Subscribe Transport
//!
//! Carries image streams and service calls between the components of the
//! snapshotter.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │   Camera     │                    │  Snapshot    │
//! │  (producer)  │    publish()       │   broker     │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! ## Semantics
//!
//! - **Volatile delivery:** a subscription only sees events published after
//!   it was created.
//! - **Non-blocking publish:** slow subscribers lag and drop the oldest events.
//! - **Topic registry:** producers `advertise()` a topic so consumers can wait
//!   for one to exist; subscriptions and advertisements unregister on drop.
//! - **Services:** request/response pairs travel on a service topic and are
//!   matched by `RequestId`.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod publisher;
mod registry;
pub mod subscriber;

// Re-export main types
pub use events::{BusEvent, EventFilter, EventKind, Topic};
pub use publisher::{InMemoryEventBus, PublisherHandle};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before the oldest are dropped.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;
