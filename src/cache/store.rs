//! Isolated region storage.
//!
//! Each entity type gets one LRU-bounded region. Readers populate entries on
//! demand; only the refresher evicts them.

use std::sync::{Arc, RwLock};

use lru::LruCache;
use metrics::counter;

use crate::domain::entities::{AccessRule, ContentDocument};

use super::config::CacheConfig;
use super::keys::{EntityType, RegionKey};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_REGION_HIT: &str = "cachewire_region_hit_total";
pub(crate) const METRIC_REGION_MISS: &str = "cachewire_region_miss_total";
pub(crate) const METRIC_REGION_CLEAR: &str = "cachewire_region_clear_total";

/// Value cached inside an isolated region.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedEntry {
    Content(Arc<ContentDocument>),
    AccessRules(Arc<Vec<AccessRule>>),
}

impl CachedEntry {
    pub fn as_content(&self) -> Option<&ContentDocument> {
        match self {
            CachedEntry::Content(doc) => Some(doc),
            CachedEntry::AccessRules(_) => None,
        }
    }
}

/// One independently clearable cache bucket.
pub struct IsolatedRegion {
    entity_type: EntityType,
    entries: RwLock<LruCache<RegionKey, CachedEntry>>,
}

impl IsolatedRegion {
    pub fn new(entity_type: EntityType, config: &CacheConfig) -> Self {
        Self {
            entity_type,
            entries: RwLock::new(LruCache::new(config.region_limit(entity_type))),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn get(&self, key: &RegionKey) -> Option<CachedEntry> {
        let entry = rw_write(&self.entries, SOURCE, "get").get(key).cloned();
        let metric = if entry.is_some() {
            METRIC_REGION_HIT
        } else {
            METRIC_REGION_MISS
        };
        counter!(metric, "region" => self.entity_type.as_str()).increment(1);
        entry
    }

    pub fn insert(&self, key: RegionKey, entry: CachedEntry) {
        rw_write(&self.entries, SOURCE, "insert").put(key, entry);
    }

    /// Cache a content item under both its id and its key.
    pub fn insert_content(&self, doc: ContentDocument) {
        let doc = Arc::new(doc);
        let mut entries = rw_write(&self.entries, SOURCE, "insert_content");
        entries.put(RegionKey::Id(doc.id), CachedEntry::Content(Arc::clone(&doc)));
        entries.put(RegionKey::Key(doc.key), CachedEntry::Content(doc));
    }

    /// Remove one entry. Returns whether anything was removed.
    pub fn clear_item(&self, key: &RegionKey) -> bool {
        let removed = rw_write(&self.entries, SOURCE, "clear_item")
            .pop(key)
            .is_some();
        counter!(METRIC_REGION_CLEAR, "region" => self.entity_type.as_str(), "mode" => "item")
            .increment(1);
        removed
    }

    /// Remove every entry. Returns how many were removed.
    pub fn clear_all(&self) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "clear_all");
        let removed = entries.len();
        entries.clear();
        counter!(METRIC_REGION_CLEAR, "region" => self.entity_type.as_str(), "mode" => "all")
            .increment(1);
        removed
    }

    pub fn contains(&self, key: &RegionKey) -> bool {
        rw_read(&self.entries, SOURCE, "contains").contains(key)
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
