//! Ports layer for the snapshotter.
//!
//! Defines the hexagonal architecture port traits:
//! - Inbound (Driving) ports: the still service as callers see it
//! - Outbound (Driven) ports: stream, timer, response and readiness collaborators

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
