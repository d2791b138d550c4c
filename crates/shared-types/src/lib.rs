//! # Shared Types Crate
//!
//! Image and service message types shared by the bus, the snapshot broker
//! and its clients.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type crossing a crate boundary lives here.
//! - **Correlation outside the payload**: requests and responses are matched
//!   by the `RequestId` the bus carries alongside them.

pub mod entities;
pub mod ipc;

pub use entities::*;
pub use ipc::*;
