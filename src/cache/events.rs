//! Cache-updated events.
//!
//! Raised after a refresher finishes an operation so other subsystems (the
//! search indexer, for one) can react without the refresher knowing them.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::domain::ContentId;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::events";

/// Monotonic epoch for ordering events raised by this process.
pub type Epoch = u64;

/// What kind of notification produced the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    RefreshAll,
    RefreshById(ContentId),
    RemoveById(ContentId),
    RefreshByInstance(ContentId),
    RemoveByInstance(ContentId),
    /// Batch replay; the raw payload travels on the event.
    RefreshByPayload,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::RefreshAll => "refresh_all",
            MessageKind::RefreshById(_) => "refresh_by_id",
            MessageKind::RemoveById(_) => "remove_by_id",
            MessageKind::RefreshByInstance(_) => "refresh_by_instance",
            MessageKind::RemoveByInstance(_) => "remove_by_instance",
            MessageKind::RefreshByPayload => "refresh_by_payload",
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, MessageKind::RefreshByPayload)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CacheUpdated {
    /// Unique identifier for idempotency.
    pub id: Uuid,
    pub epoch: Epoch,
    /// Refresher that raised the event.
    pub refresher_id: Uuid,
    pub kind: MessageKind,
    /// Raw payload for batch events.
    pub payload: Option<String>,
    pub timestamp: OffsetDateTime,
}

/// Receives cache-updated events. Called synchronously on the refreshing thread.
pub trait CacheUpdatedSubscriber: Send + Sync {
    fn on_cache_updated(&self, event: &CacheUpdated);
}

pub struct EventBus {
    subscribers: RwLock<Vec<Arc<dyn CacheUpdatedSubscriber>>>,
    epoch_counter: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self, subscriber: Arc<dyn CacheUpdatedSubscriber>) {
        rw_write(&self.subscribers, SOURCE, "subscribe").push(subscriber);
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Build and deliver an event to every subscriber.
    pub fn publish(
        &self,
        refresher_id: Uuid,
        kind: MessageKind,
        payload: Option<String>,
    ) -> CacheUpdated {
        let event = CacheUpdated {
            id: Uuid::new_v4(),
            epoch: self.next_epoch(),
            refresher_id,
            kind,
            payload,
            timestamp: OffsetDateTime::now_utc(),
        };

        // Snapshot so a subscriber may subscribe others without deadlocking.
        let subscribers = rw_read(&self.subscribers, SOURCE, "publish").clone();

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            event_kind = %event.kind,
            subscribers = subscribers.len(),
            "Cache updated event raised"
        );

        for subscriber in subscribers {
            subscriber.on_cache_updated(&event);
        }
        event
    }

    pub fn subscriber_count(&self) -> usize {
        rw_read(&self.subscribers, SOURCE, "subscriber_count").len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
