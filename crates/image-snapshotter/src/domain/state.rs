//! # Broker State Machine
//!
//! ```text
//!            admit                     frame / timeout (same request id)
//! [Idle] ────────────→ [AwaitingFrame] ─────────────────────────────────→ [Idle]
//!   ↑                        │
//!   └── admit while busy ────┘  (rejected, state untouched)
//! ```
//!
//! `AwaitingFrame` owns the subscription and timer handles of the pending
//! request, so the handles cannot outlive it and cannot exist without it.

use shared_types::RequestId;
use std::time::{Duration, Instant};

/// Fixed failure reasons sent back to callers.
pub mod reasons {
    /// A request arrived while another was in flight.
    pub const BUSY: &str = "previous request still being processed";
    /// No frame arrived before the deadline.
    pub const TIMED_OUT: &str = "timed out waiting for an image";
    /// The broker stopped before the request resolved.
    pub const SHUTTING_DOWN: &str = "shutting down";
}

/// The one admitted, not yet resolved still request.
#[derive(Debug)]
pub struct PendingRequest<S, T> {
    /// Where the single response goes.
    pub request_id: RequestId,
    /// When the request was admitted.
    pub admitted_at: Instant,
    /// When the request is abandoned. `None` if past the clock's range.
    pub deadline: Option<Instant>,
    /// Transient stream subscription bound to this request.
    pub subscription: S,
    /// Timeout timer bound to this request.
    pub timer: T,
}

impl<S, T> PendingRequest<S, T> {
    /// Record a request admitted at `admitted_at` with the given wait.
    pub fn new(
        request_id: RequestId,
        admitted_at: Instant,
        timeout: Duration,
        subscription: S,
        timer: T,
    ) -> Self {
        Self {
            request_id,
            admitted_at,
            deadline: admitted_at.checked_add(timeout),
            subscription,
            timer,
        }
    }
}

/// Why an event could not resolve anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleEvent {
    /// Nothing is pending.
    Idle,
    /// A different request is pending; carries its id.
    OtherRequest(RequestId),
}

/// Whether a still request is in flight.
#[derive(Debug)]
pub enum BrokerState<S, T> {
    /// Ready to admit.
    Idle,
    /// One request admitted, waiting for a frame or its timeout.
    AwaitingFrame(PendingRequest<S, T>),
}

impl<S, T> Default for BrokerState<S, T> {
    fn default() -> Self {
        Self::Idle
    }
}

impl<S, T> BrokerState<S, T> {
    /// Whether no request is in flight.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Id of the in-flight request, if any.
    pub fn pending_id(&self) -> Option<RequestId> {
        match self {
            Self::Idle => None,
            Self::AwaitingFrame(pending) => Some(pending.request_id),
        }
    }

    /// Store a freshly admitted request. Only valid from `Idle`.
    ///
    /// Hands the request back if one is already pending.
    pub fn admit(&mut self, pending: PendingRequest<S, T>) -> Result<(), PendingRequest<S, T>> {
        match self {
            Self::Idle => {
                *self = Self::AwaitingFrame(pending);
                Ok(())
            }
            Self::AwaitingFrame(_) => Err(pending),
        }
    }

    /// Move out the pending request if it is `request_id`, leaving `Idle`.
    ///
    /// Any other situation leaves the state untouched.
    pub fn resolve(&mut self, request_id: RequestId) -> Result<PendingRequest<S, T>, StaleEvent> {
        match self {
            Self::Idle => return Err(StaleEvent::Idle),
            Self::AwaitingFrame(pending) if pending.request_id != request_id => {
                return Err(StaleEvent::OtherRequest(pending.request_id))
            }
            Self::AwaitingFrame(_) => {}
        }
        match std::mem::take(self) {
            Self::AwaitingFrame(pending) => Ok(pending),
            Self::Idle => Err(StaleEvent::Idle),
        }
    }

    /// Move out whatever is pending, leaving `Idle`.
    pub fn take(&mut self) -> Option<PendingRequest<S, T>> {
        match std::mem::take(self) {
            Self::Idle => None,
            Self::AwaitingFrame(pending) => Some(pending),
        }
    }
}
