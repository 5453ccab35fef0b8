use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use super::Refresher;

/// Refreshers known to this node, resolved by id for inbound dispatch.
#[derive(Default, Clone)]
pub struct RefresherCollection {
    refreshers: HashMap<Uuid, Arc<dyn Refresher>>,
}

impl RefresherCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `refresher`; a second registration under the same id replaces
    /// the first.
    pub fn register(&mut self, refresher: Arc<dyn Refresher>) {
        let id = refresher.id();
        if let Some(previous) = self.refreshers.insert(id, refresher) {
            warn!(
                refresher_id = %id,
                replaced = previous.name(),
                "Refresher registered twice; keeping the latest"
            );
        }
    }

    pub fn with(mut self, refresher: Arc<dyn Refresher>) -> Self {
        self.register(refresher);
        self
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<dyn Refresher>> {
        self.refreshers.get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.refreshers.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.refreshers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refreshers.is_empty()
    }
}
