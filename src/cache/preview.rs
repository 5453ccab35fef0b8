//! Preview rendering cache.
//!
//! Holds the unpublished (draft) view of each content item so editors see
//! their changes before publishing.

use std::sync::{Arc, RwLock};

use lru::LruCache;
use uuid::Uuid;

use crate::domain::ContentId;
use crate::domain::entities::ContentDocument;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::preview";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewEntry {
    pub id: ContentId,
    pub key: Uuid,
    pub parent_id: Option<ContentId>,
    pub sort_order: i32,
    pub name: String,
    pub url_segment: String,
    pub version: u32,
}

impl From<&ContentDocument> for PreviewEntry {
    fn from(doc: &ContentDocument) -> Self {
        Self {
            id: doc.id,
            key: doc.key,
            parent_id: doc.parent_id,
            sort_order: doc.sort_order,
            name: doc.name.clone(),
            url_segment: doc.url_segment.clone(),
            version: doc.version,
        }
    }
}

pub struct PreviewCache {
    entries: RwLock<LruCache<ContentId, Arc<PreviewEntry>>>,
}

impl PreviewCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.preview_limit_non_zero())),
        }
    }

    pub fn get(&self, id: ContentId) -> Option<Arc<PreviewEntry>> {
        rw_write(&self.entries, SOURCE, "get").get(&id).cloned()
    }

    /// Replace the preview entry for `doc` with its current state.
    pub fn update(&self, doc: &ContentDocument) {
        rw_write(&self.entries, SOURCE, "update").put(doc.id, Arc::new(PreviewEntry::from(doc)));
    }

    pub fn clear(&self, id: ContentId) {
        rw_write(&self.entries, SOURCE, "clear").pop(&id);
    }

    pub fn clear_all(&self) {
        rw_write(&self.entries, SOURCE, "clear_all").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
