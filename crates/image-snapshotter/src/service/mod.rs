//! Service layer for the snapshotter.
//!
//! `SnapshotBroker` holds the state machine; `BrokerDispatcher` feeds it
//! events one at a time.

pub mod broker;
pub mod dispatcher;

pub use broker::SnapshotBroker;
pub use dispatcher::{channel, BrokerDispatcher, BrokerEvent, EventSink};
