//! Id ↔ key lookup map.
//!
//! Local integer ids are node-specific; keys are stable across the cluster.
//! The map is filled by readers resolving one form into the other.

use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::ContentId;

#[derive(Default)]
pub struct IdKeyMap {
    by_id: DashMap<ContentId, Uuid>,
    by_key: DashMap<Uuid, ContentId>,
}

impl IdKeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, id: ContentId, key: Uuid) {
        if let Some(previous) = self.by_id.insert(id, key)
            && previous != key
        {
            self.by_key.remove_if(&previous, |_, mapped| *mapped == id);
        }
        self.by_key.insert(key, id);
    }

    pub fn key_for(&self, id: ContentId) -> Option<Uuid> {
        self.by_id.get(&id).map(|entry| *entry.value())
    }

    pub fn id_for(&self, key: Uuid) -> Option<ContentId> {
        self.by_key.get(&key).map(|entry| *entry.value())
    }

    /// Drop both directions of the mapping for `id`.
    pub fn clear(&self, id: ContentId) {
        if let Some((_, key)) = self.by_id.remove(&id) {
            self.by_key.remove_if(&key, |_, mapped| *mapped == id);
        }
    }

    pub fn clear_all(&self) {
        self.by_id.clear();
        self.by_key.clear();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
