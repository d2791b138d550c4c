//! # Inbound Port - StillService
//!
//! Driving port for callers that want one still image.

use crate::error::SnapshotError;
use async_trait::async_trait;
use shared_types::ipc::{GetStillRequest, GetStillResponse};

/// Request/response access to the snapshot broker.
///
/// A call yields exactly one `GetStillResponse`. Broker-side failures (busy,
/// timed out, invalid timeout) arrive as `success: false` responses; `Err` is
/// reserved for transport failures where no response arrived at all.
///
/// # Example
///
/// ```rust,ignore
/// use image_snapshotter::ports::StillService;
/// use shared_types::ipc::GetStillRequest;
///
/// async fn grab(service: &impl StillService) {
///     let response = service.get_still(GetStillRequest::with_timeout(1.0)).await?;
///     match response.into_result() {
///         Ok(still) => println!("{} bytes of {}", still.len(), still.format),
///         Err(reason) => println!("no still: {reason}"),
///     }
/// }
/// ```
#[async_trait]
pub trait StillService: Send + Sync {
    /// Ask for one still.
    ///
    /// # Errors
    /// - `ClientTimeout`: no response arrived in time
    /// - `BusClosed`: the transport went away
    async fn get_still(&self, request: GetStillRequest) -> Result<GetStillResponse, SnapshotError>;
}
