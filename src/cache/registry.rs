//! Cache layer registry.
//!
//! Owns every cache layer of a node. Isolated regions are looked up by entity
//! type; a region that was never initialized resolves to `None` and every
//! clear against it degrades to a no-op.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;
use uuid::Uuid;

use crate::domain::ContentId;

use super::config::CacheConfig;
use super::documents::DocumentCache;
use super::domains::DomainCache;
use super::idkeys::IdKeyMap;
use super::keys::{EntityType, RegionKey};
use super::lock::{rw_read, rw_write};
use super::preview::PreviewCache;
use super::sort_order::SortOrderIndex;
use super::store::IsolatedRegion;

const SOURCE: &str = "cache::registry";

pub struct CacheRegistry {
    config: CacheConfig,
    regions: RwLock<HashMap<EntityType, Arc<IsolatedRegion>>>,
    id_keys: IdKeyMap,
    preview: PreviewCache,
    sort_order: SortOrderIndex,
    documents: DocumentCache,
    domains: DomainCache,
}

impl CacheRegistry {
    /// Create the registry with the regions named in `config`.
    pub fn new(config: CacheConfig) -> Self {
        let regions = config
            .regions
            .iter()
            .map(|entity_type| {
                (
                    *entity_type,
                    Arc::new(IsolatedRegion::new(*entity_type, &config)),
                )
            })
            .collect();

        Self {
            regions: RwLock::new(regions),
            id_keys: IdKeyMap::new(),
            preview: PreviewCache::new(&config),
            sort_order: SortOrderIndex::new(),
            documents: DocumentCache::new(&config),
            domains: DomainCache::new(&config),
            config,
        }
    }

    /// Initialize a region that was not configured at startup. Existing regions are kept.
    pub fn initialize_region(&self, entity_type: EntityType) -> Arc<IsolatedRegion> {
        let mut regions = rw_write(&self.regions, SOURCE, "initialize_region");
        Arc::clone(
            regions
                .entry(entity_type)
                .or_insert_with(|| Arc::new(IsolatedRegion::new(entity_type, &self.config))),
        )
    }

    pub fn lookup(&self, entity_type: EntityType) -> Option<Arc<IsolatedRegion>> {
        rw_read(&self.regions, SOURCE, "lookup")
            .get(&entity_type)
            .cloned()
    }

    pub fn clear_by_type(&self, entity_type: EntityType) {
        match self.lookup(entity_type) {
            Some(region) => {
                let removed = region.clear_all();
                debug!(region = %entity_type, removed, "Region wiped");
            }
            None => unavailable(entity_type, "clear_by_type"),
        }
    }

    pub fn clear_by_id(&self, entity_type: EntityType, id: ContentId) {
        self.clear_item(entity_type, RegionKey::Id(id));
    }

    pub fn clear_by_key(&self, entity_type: EntityType, key: Uuid) {
        self.clear_item(entity_type, RegionKey::Key(key));
    }

    fn clear_item(&self, entity_type: EntityType, key: RegionKey) {
        match self.lookup(entity_type) {
            Some(region) => {
                let removed = region.clear_item(&key);
                debug!(region = %entity_type, key = %key, removed, "Region entry cleared");
            }
            None => unavailable(entity_type, "clear_item"),
        }
    }

    pub fn id_keys(&self) -> &IdKeyMap {
        &self.id_keys
    }

    pub fn preview(&self) -> &PreviewCache {
        &self.preview
    }

    pub fn sort_order(&self) -> &SortOrderIndex {
        &self.sort_order
    }

    pub fn documents(&self) -> &DocumentCache {
        &self.documents
    }

    pub fn domains(&self) -> &DomainCache {
        &self.domains
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

fn unavailable(entity_type: EntityType, op: &'static str) {
    debug!(
        region = %entity_type,
        op,
        result = "skipped",
        "Cache region not initialized; nothing to clear"
    );
}

#[cfg(test)]
mod tests {
    use crate::domain::entities::ContentDocument;

    use super::*;

    fn doc(id: ContentId) -> ContentDocument {
        ContentDocument {
            id,
            key: Uuid::new_v4(),
            parent_id: None,
            level: 1,
            sort_order: 0,
            name: "Doc".to_string(),
            url_segment: "doc".to_string(),
            template_id: None,
            published: true,
            version: 1,
        }
    }

    #[test]
    fn configured_regions_are_present() {
        let registry = CacheRegistry::default();
        assert!(registry.lookup(EntityType::Content).is_some());
        assert!(registry.lookup(EntityType::PublicAccessEntry).is_some());
    }

    #[test]
    fn clears_against_missing_region_are_no_ops() {
        let registry = CacheRegistry::new(CacheConfig {
            regions: Vec::new(),
            ..Default::default()
        });

        assert!(registry.lookup(EntityType::Content).is_none());
        registry.clear_by_type(EntityType::Content);
        registry.clear_by_id(EntityType::Content, 1);
        registry.clear_by_key(EntityType::Content, Uuid::new_v4());
    }

    #[test]
    fn clear_by_id_and_key_purge_both_indices() {
        let registry = CacheRegistry::default();
        let region = registry.lookup(EntityType::Content).expect("content region");
        let item = doc(1050);
        let key = item.key;
        region.insert_content(item);

        registry.clear_by_id(EntityType::Content, 1050);
        assert!(region.contains(&RegionKey::Key(key)));

        registry.clear_by_key(EntityType::Content, key);
        assert!(region.is_empty());
    }

    #[test]
    fn initialize_region_is_idempotent() {
        let registry = CacheRegistry::new(CacheConfig {
            regions: Vec::new(),
            ..Default::default()
        });

        let first = registry.initialize_region(EntityType::Content);
        first.insert_content(doc(1));
        let second = registry.initialize_region(EntityType::Content);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.len(), 2);
    }
}
