use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use uuid::Uuid;

use crate::cache::mutex_lock;

const SOURCE: &str = "cluster::dedupe";

/// Bounded window of recently applied message ids.
pub struct SeenMessages {
    seen: Mutex<LruCache<Uuid, ()>>,
}

impl SeenMessages {
    pub fn new(window: NonZeroUsize) -> Self {
        Self {
            seen: Mutex::new(LruCache::new(window)),
        }
    }

    /// Record `id`; returns `false` when it was already inside the window.
    pub fn first_sighting(&self, id: Uuid) -> bool {
        mutex_lock(&self.seen, SOURCE, "first_sighting")
            .put(id, ())
            .is_none()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.seen, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_id_is_not_first() {
        let seen = SeenMessages::new(NonZeroUsize::new(4).unwrap());
        let id = Uuid::new_v4();
        assert!(seen.first_sighting(id));
        assert!(!seen.first_sighting(id));
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn window_forgets_oldest() {
        let seen = SeenMessages::new(NonZeroUsize::new(2).unwrap());
        let first = Uuid::new_v4();
        seen.first_sighting(first);
        seen.first_sighting(Uuid::new_v4());
        seen.first_sighting(Uuid::new_v4());

        assert!(seen.first_sighting(first));
    }
}
