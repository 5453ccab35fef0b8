//! Search-index hints fed from cache-updated events.
//!
//! The indexer itself lives elsewhere; this module only queues what it
//! should look at next.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use tracing::{info, warn};

use crate::cache::payload::{self, Operation};
use crate::cache::{CacheUpdated, CacheUpdatedSubscriber, MessageKind, mutex_lock};
use crate::domain::ContentId;

const SOURCE: &str = "search::hints";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexHint {
    RebuildAll,
    Reindex(ContentId),
    Delete(ContentId),
}

/// FIFO queue of index hints; subscribe it to the cache event bus.
#[derive(Default)]
pub struct IndexHints {
    queue: Mutex<VecDeque<IndexHint>>,
}

impl IndexHints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain up to `limit` hints in FIFO order.
    pub fn drain(&self, limit: usize) -> Vec<IndexHint> {
        let mut queue = mutex_lock(&self.queue, SOURCE, "drain");
        let count = limit.min(queue.len());
        queue.drain(..count).collect()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.queue, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn hints_for(event: &CacheUpdated) -> Vec<IndexHint> {
        match &event.kind {
            MessageKind::RefreshAll => vec![IndexHint::RebuildAll],
            MessageKind::RefreshById(id) | MessageKind::RefreshByInstance(id) => {
                vec![IndexHint::Reindex(*id)]
            }
            MessageKind::RemoveById(id) | MessageKind::RemoveByInstance(id) => {
                vec![IndexHint::Delete(*id)]
            }
            MessageKind::RefreshByPayload => {
                let Some(raw) = event.payload.as_deref() else {
                    warn!(event_id = %event.id, "Batch event without payload");
                    return Vec::new();
                };
                match payload::deserialize(raw) {
                    // One hint per record, first occurrence wins within a batch.
                    Ok(records) => {
                        let mut seen = HashSet::new();
                        records
                            .into_iter()
                            .map(|record| match record.operation {
                                Operation::Refresh => IndexHint::Reindex(record.id),
                                Operation::Deleted => IndexHint::Delete(record.id),
                            })
                            .filter(|hint| seen.insert(hint.clone()))
                            .collect()
                    }
                    Err(err) => {
                        warn!(event_id = %event.id, error = %err, "Skipping undecodable batch");
                        Vec::new()
                    }
                }
            }
        }
    }
}

impl CacheUpdatedSubscriber for IndexHints {
    fn on_cache_updated(&self, event: &CacheUpdated) {
        let hints = Self::hints_for(event);
        if hints.is_empty() {
            return;
        }
        info!(
            event_id = %event.id,
            event_kind = %event.kind,
            hints = hints.len(),
            "Search index hints queued"
        );
        mutex_lock(&self.queue, SOURCE, "on_cache_updated").extend(hints);
    }
}
