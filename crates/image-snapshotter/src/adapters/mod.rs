//! Adapters Layer
//!
//! Connects the broker ports to the shared bus and the Tokio runtime.
//!
//! ## Adapters
//!
//! - `BusFrameSource` - Transient frame subscriptions forwarded to the dispatcher
//! - `TokioTimerService` - One-shot timeouts as sleeping tasks
//! - `BusResponder` / `GetStillServer` / `GetStillClient` - The `get_still` service
//! - `BusProducerMonitor` - Waits for a publisher on the image topic

pub mod readiness;
pub mod service;
pub mod stream;
pub mod timer;

pub use readiness::{BusProducerMonitor, DEFAULT_POLL_INTERVAL};
pub use service::{BusResponder, GetStillClient, GetStillServer, DEFAULT_RESPONSE_GRACE};
pub use stream::{BusFrameSource, FrameSubscription};
pub use timer::{TimerHandle, TokioTimerService};
