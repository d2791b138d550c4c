//! # Topic Registry
//!
//! Per-topic bookkeeping of who publishes and who listens. Counts are held
//! by RAII leases: registering returns a `Lease`, dropping it unregisters.

use crate::events::Topic;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Side of a topic a lease was taken for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Publisher,
    Subscriber,
}

/// Publisher and subscriber counts keyed by topic.
#[derive(Debug, Default)]
pub(crate) struct TopicRegistry {
    publishers: Mutex<HashMap<Topic, usize>>,
    subscribers: Mutex<HashMap<Topic, usize>>,
}

impl TopicRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn table(&self, role: Role) -> &Mutex<HashMap<Topic, usize>> {
        match role {
            Role::Publisher => &self.publishers,
            Role::Subscriber => &self.subscribers,
        }
    }

    /// Register `topics` under `role` and return the lease that undoes it.
    pub(crate) fn lease(self: &Arc<Self>, role: Role, topics: Vec<Topic>) -> Lease {
        {
            let mut table = self.table(role).lock();
            for topic in &topics {
                *table.entry(topic.clone()).or_insert(0) += 1;
            }
        }
        Lease {
            registry: Arc::clone(self),
            role,
            topics,
        }
    }

    pub(crate) fn count(&self, role: Role, topic: &Topic) -> usize {
        self.table(role).lock().get(topic).copied().unwrap_or(0)
    }

    fn release(&self, role: Role, topics: &[Topic]) {
        let mut table = self.table(role).lock();
        for topic in topics {
            let Some(count) = table.get_mut(topic) else {
                continue;
            };
            *count = count.saturating_sub(1);
            if *count == 0 {
                table.remove(topic);
            }
        }
    }
}

/// Registration of one publisher or subscriber. Unregisters on drop.
#[derive(Debug)]
pub(crate) struct Lease {
    registry: Arc<TopicRegistry>,
    role: Role,
    topics: Vec<Topic>,
}

impl Lease {
    #[cfg(test)]
    pub(crate) fn topics(&self) -> &[Topic] {
        &self.topics
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.registry.release(self.role, &self.topics);
        debug!(role = ?self.role, topics = ?self.topics, "Topic lease released");
    }
}
