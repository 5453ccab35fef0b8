//! Published document projection.
//!
//! The runtime view the front end renders from. Rebuilt per item by the
//! refresher; also serves published-content lookups for the renderer.

use std::sync::{Arc, RwLock};

use lru::LruCache;
use uuid::Uuid;

use crate::domain::ContentId;
use crate::domain::entities::ContentDocument;

use super::config::CacheConfig;
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::documents";

/// Read-only projection of a published content item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedContent {
    pub id: ContentId,
    pub key: Uuid,
    pub parent_id: Option<ContentId>,
    pub name: String,
    pub url: String,
    pub template_id: Option<i32>,
    pub level: u16,
    pub sort_order: i32,
}

pub struct DocumentCache {
    entries: RwLock<LruCache<ContentId, Arc<PublishedContent>>>,
}

impl DocumentCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.document_limit_non_zero())),
        }
    }

    pub fn get(&self, id: ContentId) -> Option<Arc<PublishedContent>> {
        rw_write(&self.entries, SOURCE, "get").get(&id).cloned()
    }

    /// Rebuild the projection for `doc`. Unpublished items are dropped.
    pub fn rebuild(&self, doc: &ContentDocument) {
        let mut entries = rw_write(&self.entries, SOURCE, "rebuild");
        if !doc.published {
            entries.pop(&doc.id);
            return;
        }

        let parent_url = doc
            .parent_id
            .and_then(|parent| entries.peek(&parent).map(|p| p.url.clone()))
            .unwrap_or_default();
        let url = format!("{}/{}", parent_url.trim_end_matches('/'), doc.url_segment);

        entries.put(
            doc.id,
            Arc::new(PublishedContent {
                id: doc.id,
                key: doc.key,
                parent_id: doc.parent_id,
                name: doc.name.clone(),
                url,
                template_id: doc.template_id,
                level: doc.level,
                sort_order: doc.sort_order,
            }),
        );
    }

    pub fn remove(&self, id: ContentId) {
        rw_write(&self.entries, SOURCE, "remove").pop(&id);
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
