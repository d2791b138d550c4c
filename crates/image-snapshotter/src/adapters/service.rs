//! `get_still` service over the shared bus.
//!
//! Requests and responses travel on the service topic as
//! `BusEvent::GetStillRequest` / `BusEvent::GetStillResponse` and are
//! correlated by `RequestId`.
//!
//! ```text
//! GetStillClient ──GetStillRequest──→ bus ──→ GetStillServer ──→ EventSink
//!       ↑                                                           │
//!       └──────────── bus ←──GetStillResponse── BusResponder ←── broker
//! ```

use crate::error::SnapshotError;
use crate::ports::{Responder, StillService};
use crate::service::{BrokerEvent, EventSink};
use async_trait::async_trait;
use shared_bus::{BusEvent, EventFilter, InMemoryEventBus, Subscription, Topic};
use shared_types::entities::RequestId;
use shared_types::ipc::{GetStillRequest, GetStillResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Extra time a client waits beyond the request timeout before giving up.
pub const DEFAULT_RESPONSE_GRACE: Duration = Duration::from_secs(1);

/// `Responder` that publishes responses on the service topic.
#[derive(Clone)]
pub struct BusResponder {
    bus: Arc<InMemoryEventBus>,
    service: Topic,
}

impl BusResponder {
    pub fn new(bus: Arc<InMemoryEventBus>, service: impl Into<Topic>) -> Self {
        Self {
            bus,
            service: service.into(),
        }
    }
}

impl Responder for BusResponder {
    fn respond(&self, request_id: RequestId, response: GetStillResponse) {
        let success = response.success;
        let receivers = self.bus.send(BusEvent::GetStillResponse {
            service: self.service.clone(),
            request_id,
            response,
        });
        if receivers == 0 {
            warn!(request_id = %request_id, success, "No caller listening for response");
        } else {
            debug!(request_id = %request_id, success, "Response sent");
        }
    }
}

/// Receives still requests on the service topic and queues them for the broker.
pub struct GetStillServer {
    service: Topic,
    requests: Subscription,
    sink: EventSink,
}

impl GetStillServer {
    /// Start listening on `service`. Requests published from now on are kept
    /// until `run` picks them up.
    pub fn bind(bus: &InMemoryEventBus, service: impl Into<Topic>, sink: EventSink) -> Self {
        let service = service.into();
        let requests = bus.subscribe(EventFilter::service_requests(service.clone()));
        info!(service = %service, "Still service registered");
        Self {
            service,
            requests,
            sink,
        }
    }

    pub fn service(&self) -> &Topic {
        &self.service
    }

    /// Forward requests until shutdown, the bus closes, or the dispatcher is gone.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        if *shutdown.borrow_and_update() {
            return;
        }
        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                event = self.requests.recv() => {
                    let Some(event) = event else {
                        warn!(service = %self.service, "Event stream ended, shutting down");
                        break;
                    };
                    let BusEvent::GetStillRequest { request_id, request, .. } = event else {
                        continue;
                    };
                    debug!(
                        request_id = %request_id,
                        timeout_secs = request.timeout_secs,
                        "Handling GetStillRequest"
                    );
                    let posted = self.sink.post(BrokerEvent::GetStill {
                        request_id,
                        timeout_secs: request.timeout_secs,
                    });
                    if !posted {
                        warn!(service = %self.service, "Broker dispatcher gone, shutting down");
                        break;
                    }
                }
            }
        }
        info!(service = %self.service, "Still service stopped");
    }
}

/// Caller side of the `get_still` service.
#[derive(Clone)]
pub struct GetStillClient {
    bus: Arc<InMemoryEventBus>,
    service: Topic,
    default_timeout: Duration,
    grace: Duration,
}

impl GetStillClient {
    /// Client for `service`. `default_timeout` should match the server's so
    /// that `0.0` requests are waited for long enough.
    pub fn new(
        bus: Arc<InMemoryEventBus>,
        service: impl Into<Topic>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            bus,
            service: service.into(),
            default_timeout,
            grace: DEFAULT_RESPONSE_GRACE,
        }
    }

    /// Wait `grace` beyond the request timeout before giving up.
    #[must_use]
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// How long `get_still(request)` waits for its response.
    pub fn response_deadline(&self, request: &GetStillRequest) -> Duration {
        let timeout = if request.timeout_secs > 0.0 {
            Duration::try_from_secs_f64(request.timeout_secs).unwrap_or(self.default_timeout)
        } else {
            self.default_timeout
        };
        timeout + self.grace
    }

    /// Issue `request` under a caller-chosen `request_id`.
    ///
    /// # Errors
    /// - `ClientTimeout`: no response within `response_deadline`
    /// - `BusClosed`: the bus went away while waiting
    pub async fn call(
        &self,
        request_id: RequestId,
        request: GetStillRequest,
    ) -> Result<GetStillResponse, SnapshotError> {
        let deadline = self.response_deadline(&request);

        // Listen before asking so the response cannot slip past.
        let mut responses = self
            .bus
            .subscribe(EventFilter::service_responses(self.service.clone()));
        self.bus.send(BusEvent::GetStillRequest {
            service: self.service.clone(),
            request_id,
            request,
        });
        debug!(request_id = %request_id, service = %self.service, "GetStillRequest sent");

        match tokio::time::timeout(deadline, Self::await_response(&mut responses, request_id)).await
        {
            Ok(Some(response)) => Ok(response),
            Ok(None) => Err(SnapshotError::BusClosed),
            Err(_) => {
                warn!(request_id = %request_id, "No response from still service");
                Err(SnapshotError::ClientTimeout(deadline))
            }
        }
    }

    async fn await_response(
        responses: &mut Subscription,
        request_id: RequestId,
    ) -> Option<GetStillResponse> {
        while let Some(event) = responses.recv().await {
            if let BusEvent::GetStillResponse {
                request_id: id,
                response,
                ..
            } = event
            {
                if id == request_id {
                    return Some(response);
                }
            }
        }
        None
    }
}

#[async_trait]
impl StillService for GetStillClient {
    async fn get_still(&self, request: GetStillRequest) -> Result<GetStillResponse, SnapshotError> {
        self.call(RequestId::new(), request).await
    }
}
