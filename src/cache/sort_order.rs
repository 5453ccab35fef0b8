//! Sort-order bookkeeping.
//!
//! Tracks the ordered children of every known parent so listings and URL
//! resolution agree on sibling order.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::domain::ContentId;
use crate::domain::entities::ContentDocument;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::sort_order";

#[derive(Default)]
struct SortState {
    // parent (None for roots) -> [(sort_order, id)] kept sorted
    children: HashMap<Option<ContentId>, Vec<(i32, ContentId)>>,
    parent_of: HashMap<ContentId, Option<ContentId>>,
}

impl SortState {
    fn detach(&mut self, id: ContentId) {
        if let Some(parent) = self.parent_of.remove(&id)
            && let Some(siblings) = self.children.get_mut(&parent)
        {
            siblings.retain(|(_, sibling)| *sibling != id);
            if siblings.is_empty() {
                self.children.remove(&parent);
            }
        }
    }

    fn attach(&mut self, doc: &ContentDocument) {
        self.detach(doc.id);
        let siblings = self.children.entry(doc.parent_id).or_default();
        let entry = (doc.sort_order, doc.id);
        let position = siblings.partition_point(|existing| *existing < entry);
        siblings.insert(position, entry);
        self.parent_of.insert(doc.id, doc.parent_id);
    }
}

#[derive(Default)]
pub struct SortOrderIndex {
    state: RwLock<SortState>,
}

impl SortOrderIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-seat `doc` among its siblings and replace its direct children.
    pub fn update(&self, doc: &ContentDocument, children: &[ContentDocument]) {
        let mut state = rw_write(&self.state, SOURCE, "update");
        state.attach(doc);

        let stale: Vec<ContentId> = state
            .children
            .get(&Some(doc.id))
            .map(|existing| existing.iter().map(|(_, id)| *id).collect())
            .unwrap_or_default();
        for id in stale {
            state.detach(id);
        }
        for child in children.iter().filter(|child| child.parent_id == Some(doc.id)) {
            state.attach(child);
        }
    }

    /// Forget `id` as a child. Its own children stay until refreshed.
    pub fn remove(&self, id: ContentId) {
        rw_write(&self.state, SOURCE, "remove").detach(id);
    }

    pub fn children_of(&self, parent: Option<ContentId>) -> Vec<ContentId> {
        rw_read(&self.state, SOURCE, "children_of")
            .children
            .get(&parent)
            .map(|entries| entries.iter().map(|(_, id)| *id).collect())
            .unwrap_or_default()
    }

    pub fn parent_of(&self, id: ContentId) -> Option<Option<ContentId>> {
        rw_read(&self.state, SOURCE, "parent_of")
            .parent_of
            .get(&id)
            .copied()
    }

    pub fn clear(&self) {
        let mut state = rw_write(&self.state, SOURCE, "clear");
        state.children.clear();
        state.parent_of.clear();
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn doc(id: ContentId, parent: Option<ContentId>, sort_order: i32) -> ContentDocument {
        ContentDocument {
            id,
            key: Uuid::new_v4(),
            parent_id: parent,
            level: 1,
            sort_order,
            name: format!("Node {id}"),
            url_segment: format!("node-{id}"),
            template_id: None,
            published: true,
            version: 1,
        }
    }

    #[test]
    fn siblings_are_ordered_by_sort_order() {
        let index = SortOrderIndex::new();
        index.update(&doc(3, Some(1), 2), &[]);
        index.update(&doc(2, Some(1), 0), &[]);
        index.update(&doc(4, Some(1), 1), &[]);

        assert_eq!(index.children_of(Some(1)), vec![2, 4, 3]);
    }

    #[test]
    fn moving_a_node_detaches_it_from_old_parent() {
        let index = SortOrderIndex::new();
        index.update(&doc(5, Some(1), 0), &[]);
        index.update(&doc(5, Some(2), 0), &[]);

        assert!(index.children_of(Some(1)).is_empty());
        assert_eq!(index.children_of(Some(2)), vec![5]);
        assert_eq!(index.parent_of(5), Some(Some(2)));
    }

    #[test]
    fn update_replaces_children() {
        let index = SortOrderIndex::new();
        let parent = doc(1, None, 0);
        index.update(&parent, &[doc(10, Some(1), 1), doc(11, Some(1), 0)]);
        assert_eq!(index.children_of(Some(1)), vec![11, 10]);

        index.update(&parent, &[doc(12, Some(1), 0)]);
        assert_eq!(index.children_of(Some(1)), vec![12]);
        assert_eq!(index.parent_of(10), None);
    }

    #[test]
    fn remove_is_idempotent() {
        let index = SortOrderIndex::new();
        index.update(&doc(7, None, 0), &[]);
        index.remove(7);
        index.remove(7);
        assert!(index.children_of(None).is_empty());
    }
}
