//! Read-through access to content, backed by the node's cache layers.

use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::cache::{CacheRegistry, CachedEntry, EntityType, RegionKey};
use crate::domain::ContentId;
use crate::domain::entities::{AccessRule, ContentDocument, DomainRoute};

use super::repos::{ContentStore, RepoError};

/// Readers populate regions lazily; the refresher is the only one evicting.
#[derive(Clone)]
pub struct ContentReader {
    registry: Arc<CacheRegistry>,
    store: Arc<dyn ContentStore>,
}

impl ContentReader {
    pub fn new(registry: Arc<CacheRegistry>, store: Arc<dyn ContentStore>) -> Self {
        Self { registry, store }
    }

    pub fn by_id(&self, id: ContentId) -> Result<Option<Arc<ContentDocument>>, RepoError> {
        self.read_content(RegionKey::Id(id), || self.store.find_by_id(id))
    }

    pub fn by_key(&self, key: Uuid) -> Result<Option<Arc<ContentDocument>>, RepoError> {
        self.read_content(RegionKey::Key(key), || self.store.find_by_key(key))
    }

    pub fn access_rules(&self, id: ContentId) -> Result<Arc<Vec<AccessRule>>, RepoError> {
        let key = RegionKey::Id(id);
        let region = self.registry.lookup(EntityType::PublicAccessEntry);
        if let Some(region) = region.as_ref()
            && let Some(CachedEntry::AccessRules(rules)) = region.get(&key)
        {
            return Ok(rules);
        }

        let rules = Arc::new(self.store.access_rules_for(id)?);
        if let Some(region) = region {
            region.insert(key, CachedEntry::AccessRules(Arc::clone(&rules)));
        }
        Ok(rules)
    }

    /// Resolve a request host through the domain cache.
    pub fn route_for_host(&self, host: &str) -> Result<Option<DomainRoute>, RepoError> {
        let mut failure = None;
        let route = self.registry.domains().get_or_insert_with(host, || {
            self.store.find_domain(host).unwrap_or_else(|err| {
                failure = Some(err);
                None
            })
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(route),
        }
    }

    fn read_content<F>(
        &self,
        key: RegionKey,
        load: F,
    ) -> Result<Option<Arc<ContentDocument>>, RepoError>
    where
        F: FnOnce() -> Result<Option<ContentDocument>, RepoError>,
    {
        let region = self.registry.lookup(EntityType::Content);
        if let Some(region) = region.as_ref()
            && let Some(CachedEntry::Content(doc)) = region.get(&key)
        {
            return Ok(Some(doc));
        }

        let Some(doc) = load()? else {
            debug!(%key, "Content not found in store");
            return Ok(None);
        };
        self.registry.id_keys().register(doc.id, doc.key);
        if let Some(region) = region {
            region.insert_content(doc.clone());
        }
        Ok(Some(Arc::new(doc)))
    }
}
