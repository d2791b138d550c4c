//! # Domain Layer
//!
//! Pure state and rules of the snapshot broker, no I/O.
//!
//! ## Components
//!
//! - `state`: `BrokerState` (Idle / AwaitingFrame), `PendingRequest`, failure reasons
//! - `config`: `BrokerConfig`, default topic and timeout, timeout resolution

pub mod config;
pub mod state;

pub use config::*;
pub use state::*;
