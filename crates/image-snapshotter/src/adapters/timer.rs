//! Tokio timer adapter.

use crate::ports::TimerService;
use crate::service::{BrokerEvent, EventSink};
use shared_types::entities::RequestId;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// `TimerService` backed by `tokio::time::sleep` tasks.
///
/// Must be used from within a Tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioTimerService {
    sink: EventSink,
}

impl TokioTimerService {
    pub fn new(sink: EventSink) -> Self {
        Self { sink }
    }
}

/// An armed timer. Dropping it aborts the timer task.
#[derive(Debug)]
pub struct TimerHandle {
    request_id: RequestId,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TimerService for TokioTimerService {
    type Timer = TimerHandle;

    fn arm(&self, duration: Duration, request_id: RequestId) -> TimerHandle {
        let sink = self.sink.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(request_id = %request_id, "Timer fired");
            sink.post(BrokerEvent::TimerFired { request_id });
        });
        TimerHandle { request_id, task }
    }

    fn cancel(&self, timer: TimerHandle) {
        trace!(request_id = %timer.request_id, "Timer cancelled");
        drop(timer);
    }
}
