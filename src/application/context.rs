//! Wiring of one cluster node's shared state.

use std::sync::Arc;

use crate::cache::{CacheConfig, CacheRegistry, EventBus};
use crate::cluster::{ClusterConfig, ClusterTransport, DistributedCache};
use crate::refresher::{ContentRefresher, RefresherCollection, StepObserver};
use crate::search::IndexHints;

use super::reader::ContentReader;
use super::repos::ContentStore;

/// Everything a node shares between its HTTP surface and its refreshers.
#[derive(Clone)]
pub struct NodeContext {
    pub registry: Arc<CacheRegistry>,
    pub events: Arc<EventBus>,
    pub store: Arc<dyn ContentStore>,
    pub refresher: Arc<ContentRefresher>,
    pub cluster: Arc<DistributedCache>,
    pub reader: ContentReader,
    pub index_hints: Arc<IndexHints>,
}

pub struct NodeBuilder {
    cache: CacheConfig,
    cluster: ClusterConfig,
    store: Arc<dyn ContentStore>,
    transport: Arc<dyn ClusterTransport>,
    observer: Option<Arc<dyn StepObserver>>,
}

impl NodeBuilder {
    pub fn new(
        cache: CacheConfig,
        cluster: ClusterConfig,
        store: Arc<dyn ContentStore>,
        transport: Arc<dyn ClusterTransport>,
    ) -> Self {
        Self {
            cache,
            cluster,
            store,
            transport,
            observer: None,
        }
    }

    pub fn observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> NodeContext {
        let registry = Arc::new(CacheRegistry::new(self.cache));
        let events = Arc::new(EventBus::new());
        let index_hints = Arc::new(IndexHints::new());
        events.subscribe(index_hints.clone());

        let mut refresher =
            ContentRefresher::new(registry.clone(), self.store.clone(), events.clone());
        if let Some(observer) = self.observer {
            refresher = refresher.with_observer(observer);
        }
        let refresher = Arc::new(refresher);

        let refreshers = RefresherCollection::new().with(refresher.clone());
        let cluster = Arc::new(DistributedCache::new(
            self.cluster,
            refreshers,
            self.transport,
        ));
        let reader = ContentReader::new(registry.clone(), self.store.clone());

        NodeContext {
            registry,
            events,
            store: self.store,
            refresher,
            cluster,
            reader,
            index_hints,
        }
    }
}
