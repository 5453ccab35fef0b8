//! Content refresher: replays one change notification as an ordered sequence
//! of region invalidations.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::application::repos::ContentStore;
use crate::cache::payload::{self, ChangeRecord, Operation};
use crate::cache::{CacheRegistry, EntityType, EventBus, MessageKind};
use crate::domain::ContentId;
use crate::domain::entities::ContentDocument;

use super::operation::OperationKind;
use super::steps::{RefreshReport, RefreshStep, StepError, StepObserver, StepRunner};
use super::Refresher;

pub(crate) const METRIC_REFRESH_MS: &str = "cachewire_refresh_ms";

/// Identifier peers use to route content notifications to this refresher.
pub const CONTENT_REFRESHER_ID: Uuid = Uuid::from_u128(0x55698352_dfc5_4dbe_96bd_a4a0f6f77145);

pub struct ContentRefresher {
    registry: Arc<CacheRegistry>,
    store: Arc<dyn ContentStore>,
    events: Arc<EventBus>,
    observer: Option<Arc<dyn StepObserver>>,
}

impl ContentRefresher {
    pub fn new(
        registry: Arc<CacheRegistry>,
        store: Arc<dyn ContentStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            store,
            events,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    #[instrument(skip(self))]
    pub fn refresh_all(&self) -> RefreshReport {
        let started_at = Instant::now();
        let mut run = self.runner("refresh_all");
        let registry = &self.registry;

        run.run(RefreshStep::ClearIdKeyMap, || {
            registry.id_keys().clear_all();
            Ok(())
        });
        run.run(RefreshStep::WipeRegion(EntityType::Content), || {
            registry.clear_by_type(EntityType::Content);
            Ok(())
        });
        self.wipe_access_rules(&mut run);
        // Local only: peers receive their own RefreshAll and clear their own.
        self.clear_domains(&mut run);
        run.run(RefreshStep::ClearAllPreview, || {
            registry.preview().clear_all();
            Ok(())
        });
        self.raise(&mut run, MessageKind::RefreshAll, None);

        self.finish(run, started_at)
    }

    #[instrument(skip(self))]
    pub fn refresh(&self, id: ContentId) -> RefreshReport {
        let started_at = Instant::now();
        let mut run = self.runner("refresh");

        let key = self.registry.id_keys().key_for(id);
        self.clear_content(&mut run, id, key);
        self.wipe_access_rules(&mut run);
        let doc = self.load(&mut run, id);
        self.replay_document(&mut run, id, doc.as_ref());
        self.clear_domains(&mut run);
        self.raise(&mut run, MessageKind::RefreshById(id), None);

        self.finish(run, started_at)
    }

    #[instrument(skip(self))]
    pub fn remove(&self, id: ContentId) -> RefreshReport {
        let started_at = Instant::now();
        let mut run = self.runner("remove");

        // Resolve before the sequence drops the mapping.
        let key = self.registry.id_keys().key_for(id);
        self.remove_sequence(&mut run, id, key);
        self.raise(&mut run, MessageKind::RemoveById(id), None);

        self.finish(run, started_at)
    }

    /// Refresh using the supplied document instead of a store load.
    #[instrument(skip(self, doc), fields(id = doc.id))]
    pub fn refresh_instance(&self, doc: &ContentDocument) -> RefreshReport {
        let started_at = Instant::now();
        let mut run = self.runner("refresh_instance");

        self.clear_content(&mut run, doc.id, Some(doc.key));
        self.wipe_access_rules(&mut run);
        self.registry.id_keys().register(doc.id, doc.key);
        self.replay_document(&mut run, doc.id, Some(doc));
        self.clear_domains(&mut run);
        self.raise(&mut run, MessageKind::RefreshByInstance(doc.id), None);

        self.finish(run, started_at)
    }

    /// Remove sequence for a known instance; the key variant is cleared too.
    #[instrument(skip(self, doc), fields(id = doc.id))]
    pub fn remove_instance(&self, doc: &ContentDocument) -> RefreshReport {
        let started_at = Instant::now();
        let mut run = self.runner("remove_instance");

        self.remove_sequence(&mut run, doc.id, Some(doc.key));
        self.raise(&mut run, MessageKind::RemoveByInstance(doc.id), None);

        self.finish(run, started_at)
    }

    /// Decode and replay a batch payload. A malformed payload touches nothing.
    #[instrument(skip(self, raw), fields(payload_len = raw.len()))]
    pub fn refresh_payload(&self, raw: &str) -> RefreshReport {
        let started_at = Instant::now();
        let mut run = self.runner("refresh_by_payload");

        let records = match payload::deserialize(raw) {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "Rejecting malformed refresh payload");
                run.report.rejected = Some(err.to_string());
                return self.finish(run, started_at);
            }
        };

        self.wipe_access_rules(&mut run);
        for record in &records {
            self.replay_record(&mut run, record);
        }
        self.clear_domains(&mut run);
        self.raise(&mut run, MessageKind::RefreshByPayload, Some(raw.to_string()));

        self.finish(run, started_at)
    }

    fn replay_record(&self, run: &mut StepRunner<'_>, record: &ChangeRecord) {
        let id = record.id;
        // Resolve the key before a Deleted record drops the mapping.
        let key = record.key.or_else(|| self.registry.id_keys().key_for(id));

        self.clear_content(run, id, key);

        match record.operation {
            Operation::Deleted => {
                self.clear_id_key_entry(run, id);
                self.drop_document(run, id);
                self.clear_preview(run, id);
            }
            Operation::Refresh => {
                let doc = self.load(run, id);
                self.replay_document(run, id, doc.as_ref());
            }
        }
    }

    fn remove_sequence(&self, run: &mut StepRunner<'_>, id: ContentId, key: Option<Uuid>) {
        self.clear_id_key_entry(run, id);
        self.clear_content(run, id, key);
        self.wipe_access_rules(run);
        self.drop_document(run, id);
        self.clear_domains(run);
        self.clear_preview(run, id);
    }

    /// Sort order, projection and preview for `id`. A missing document drops
    /// all three.
    fn replay_document(
        &self,
        run: &mut StepRunner<'_>,
        id: ContentId,
        doc: Option<&ContentDocument>,
    ) {
        let registry = &self.registry;
        let store = &self.store;

        run.run(RefreshStep::UpdateSortOrder(id), || {
            match doc {
                Some(doc) => {
                    let children = store.children_of(id)?;
                    registry.sort_order().update(doc, &children);
                }
                None => registry.sort_order().remove(id),
            }
            Ok(())
        });
        run.run(RefreshStep::RebuildDocument(id), || {
            match doc {
                Some(doc) => registry.documents().rebuild(doc),
                None => registry.documents().remove(id),
            }
            Ok(())
        });
        run.run(RefreshStep::UpdatePreview(id), || {
            match doc {
                Some(doc) => registry.preview().update(doc),
                None => registry.preview().clear(id),
            }
            Ok(())
        });
    }

    fn load(&self, run: &mut StepRunner<'_>, id: ContentId) -> Option<ContentDocument> {
        let mut loaded = None;
        let store = &self.store;
        let registry = &self.registry;
        run.run(RefreshStep::LoadDocument(id), || {
            loaded = store.find_by_id(id).map_err(StepError::from)?;
            match &loaded {
                Some(doc) => registry.id_keys().register(doc.id, doc.key),
                None => info!(id, "Refreshed content no longer exists; dropping its entries"),
            }
            Ok(())
        });
        loaded
    }

    /// Both index variants of a content item; the key variant only when known.
    fn clear_content(&self, run: &mut StepRunner<'_>, id: ContentId, key: Option<Uuid>) {
        self.clear_content_by_id(run, id);
        if let Some(key) = key {
            self.clear_content_by_key(run, key);
        }
    }

    fn clear_content_by_id(&self, run: &mut StepRunner<'_>, id: ContentId) {
        run.run(RefreshStep::ClearRegionById(EntityType::Content, id), || {
            self.registry.clear_by_id(EntityType::Content, id);
            Ok(())
        });
    }

    fn clear_content_by_key(&self, run: &mut StepRunner<'_>, key: Uuid) {
        run.run(RefreshStep::ClearRegionByKey(EntityType::Content, key), || {
            self.registry.clear_by_key(EntityType::Content, key);
            Ok(())
        });
    }

    fn clear_id_key_entry(&self, run: &mut StepRunner<'_>, id: ContentId) {
        run.run(RefreshStep::ClearIdKeyEntry(id), || {
            self.registry.id_keys().clear(id);
            Ok(())
        });
    }

    fn wipe_access_rules(&self, run: &mut StepRunner<'_>) {
        run.run(RefreshStep::WipeRegion(EntityType::PublicAccessEntry), || {
            self.registry.clear_by_type(EntityType::PublicAccessEntry);
            Ok(())
        });
    }

    fn drop_document(&self, run: &mut StepRunner<'_>, id: ContentId) {
        run.run(RefreshStep::DropDocument(id), || {
            self.registry.sort_order().remove(id);
            self.registry.documents().remove(id);
            Ok(())
        });
    }

    fn clear_preview(&self, run: &mut StepRunner<'_>, id: ContentId) {
        run.run(RefreshStep::ClearPreview(id), || {
            self.registry.preview().clear(id);
            Ok(())
        });
    }

    fn clear_domains(&self, run: &mut StepRunner<'_>) {
        run.run(RefreshStep::ClearDomainCache, || {
            self.registry.domains().clear();
            Ok(())
        });
    }

    fn raise(&self, run: &mut StepRunner<'_>, kind: MessageKind, payload: Option<String>) {
        run.run(RefreshStep::RaiseEvent(kind.clone()), || {
            self.events.publish(CONTENT_REFRESHER_ID, kind, payload);
            Ok(())
        });
    }

    fn runner(&self, operation: &'static str) -> StepRunner<'_> {
        StepRunner::new(operation, self.observer.as_ref())
    }

    fn finish(&self, run: StepRunner<'_>, started_at: Instant) -> RefreshReport {
        let report = run.finish();
        histogram!(METRIC_REFRESH_MS, "operation" => report.operation)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        info!(
            operation = report.operation,
            steps = report.steps_run,
            failed = report.failures.len(),
            rejected = report.rejected.is_some(),
            "Refresh complete"
        );
        report
    }
}

impl Refresher for ContentRefresher {
    fn id(&self) -> Uuid {
        CONTENT_REFRESHER_ID
    }

    fn name(&self) -> &'static str {
        "content"
    }

    fn execute(&self, operation: OperationKind) -> RefreshReport {
        match operation {
            OperationKind::RefreshAll => self.refresh_all(),
            OperationKind::Refresh(id) => self.refresh(id),
            OperationKind::Remove(id) => self.remove(id),
            OperationKind::RefreshByPayload(raw) => self.refresh_payload(&raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::application::reader::ContentReader;
    use crate::application::repos::RepoError;
    use crate::cache::{CacheUpdated, CacheUpdatedSubscriber, CachedEntry, RegionKey};
    use crate::domain::entities::{AccessRule, DomainRoute};
    use crate::refresher::RecordingObserver;

    #[derive(Default)]
    struct FakeStore {
        docs: Mutex<HashMap<ContentId, ContentDocument>>,
        fail_children: bool,
        lookups: AtomicUsize,
    }

    impl FakeStore {
        fn with(docs: Vec<ContentDocument>) -> Self {
            Self {
                docs: Mutex::new(docs.into_iter().map(|d| (d.id, d)).collect()),
                ..Default::default()
            }
        }
    }

    impl ContentStore for FakeStore {
        fn find_by_id(&self, id: ContentId) -> Result<Option<ContentDocument>, RepoError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.docs.lock().unwrap().get(&id).cloned())
        }

        fn find_by_key(&self, key: Uuid) -> Result<Option<ContentDocument>, RepoError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .docs
                .lock()
                .unwrap()
                .values()
                .find(|d| d.key == key)
                .cloned())
        }

        fn children_of(&self, id: ContentId) -> Result<Vec<ContentDocument>, RepoError> {
            if self.fail_children {
                return Err(RepoError::Timeout);
            }
            Ok(self
                .docs
                .lock()
                .unwrap()
                .values()
                .filter(|d| d.parent_id == Some(id))
                .cloned()
                .collect())
        }

        fn access_rules_for(&self, _id: ContentId) -> Result<Vec<AccessRule>, RepoError> {
            Ok(Vec::new())
        }

        fn find_domain(&self, _host: &str) -> Result<Option<DomainRoute>, RepoError> {
            Ok(None)
        }
    }

    #[derive(Default)]
    struct CollectingSubscriber {
        events: Mutex<Vec<CacheUpdated>>,
    }

    impl CacheUpdatedSubscriber for CollectingSubscriber {
        fn on_cache_updated(&self, event: &CacheUpdated) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn doc(id: ContentId, parent_id: Option<ContentId>) -> ContentDocument {
        ContentDocument {
            id,
            key: Uuid::from_u128(id as u128),
            parent_id,
            level: if parent_id.is_some() { 2 } else { 1 },
            sort_order: id,
            name: format!("Doc {id}"),
            url_segment: format!("doc-{id}"),
            template_id: Some(1),
            published: true,
            version: 1,
        }
    }

    struct Harness {
        refresher: ContentRefresher,
        store: Arc<FakeStore>,
        registry: Arc<CacheRegistry>,
        recorder: Arc<RecordingObserver>,
        events: Arc<CollectingSubscriber>,
    }

    fn harness(store: FakeStore) -> Harness {
        let registry = Arc::new(CacheRegistry::default());
        let bus = Arc::new(EventBus::new());
        let events = Arc::new(CollectingSubscriber::default());
        bus.subscribe(events.clone());
        let recorder = Arc::new(RecordingObserver::new());
        let store = Arc::new(store);
        let refresher = ContentRefresher::new(registry.clone(), store.clone(), bus)
            .with_observer(recorder.clone());
        Harness {
            refresher,
            store,
            registry,
            recorder,
            events,
        }
    }

    fn content_region(registry: &CacheRegistry) -> Arc<crate::cache::IsolatedRegion> {
        registry
            .lookup(EntityType::Content)
            .expect("content region is configured by default")
    }

    #[test]
    fn remove_makes_repository_read_miss() {
        let h = harness(FakeStore::with(vec![doc(7, None)]));
        let region = content_region(&h.registry);
        region.insert_content(doc(7, None));
        assert!(region.contains(&RegionKey::Id(7)));

        let report = h.refresher.remove(7);

        assert!(report.is_clean());
        assert!(region.get(&RegionKey::Id(7)).is_none());
    }

    #[test]
    fn remove_instance_clears_key_variant() {
        let h = harness(FakeStore::default());
        let region = content_region(&h.registry);
        let removed = doc(3, None);
        region.insert_content(removed.clone());

        h.refresher.remove_instance(&removed);

        assert!(!region.contains(&RegionKey::Id(3)));
        assert!(!region.contains(&RegionKey::Key(removed.key)));
        assert_eq!(
            h.events.events.lock().unwrap()[0].kind,
            MessageKind::RemoveByInstance(3)
        );
    }

    #[test]
    fn remove_evicts_key_variant_populated_by_reader() {
        let store = Arc::new(FakeStore::with(vec![doc(7, None)]));
        let registry = Arc::new(CacheRegistry::default());
        let reader = ContentReader::new(registry.clone(), store.clone());
        let refresher = ContentRefresher::new(registry, store.clone(), Arc::new(EventBus::new()));

        reader.by_id(7).expect("read").expect("present");
        store.docs.lock().unwrap().remove(&7);

        let report = refresher.remove(7);

        assert!(report.is_clean());
        assert!(reader.by_id(7).expect("read").is_none());
        assert!(reader.by_key(Uuid::from_u128(7)).expect("read").is_none());
    }

    #[test]
    fn refresh_evicts_stale_key_variant() {
        let store = Arc::new(FakeStore::with(vec![doc(8, None)]));
        let registry = Arc::new(CacheRegistry::default());
        let reader = ContentReader::new(registry.clone(), store.clone());
        let refresher = ContentRefresher::new(registry, store.clone(), Arc::new(EventBus::new()));

        reader.by_id(8).expect("read").expect("present");
        let mut renamed = doc(8, None);
        renamed.name = "Renamed".to_string();
        store.docs.lock().unwrap().insert(8, renamed);

        refresher.refresh(8);

        let by_key = reader
            .by_key(Uuid::from_u128(8))
            .expect("read")
            .expect("present");
        assert_eq!(by_key.name, "Renamed");
    }

    #[test]
    fn refresh_instance_replays_supplied_document_without_loading() {
        let h = harness(FakeStore::default());
        let region = content_region(&h.registry);
        let stale = doc(5, None);
        region.insert_content(stale.clone());
        let mut fresh = stale.clone();
        fresh.version = 2;

        let report = h.refresher.refresh_instance(&fresh);

        assert!(report.is_clean());
        assert_eq!(
            h.recorder.steps(),
            vec![
                RefreshStep::ClearRegionById(EntityType::Content, 5),
                RefreshStep::ClearRegionByKey(EntityType::Content, fresh.key),
                RefreshStep::WipeRegion(EntityType::PublicAccessEntry),
                RefreshStep::UpdateSortOrder(5),
                RefreshStep::RebuildDocument(5),
                RefreshStep::UpdatePreview(5),
                RefreshStep::ClearDomainCache,
                RefreshStep::RaiseEvent(MessageKind::RefreshByInstance(5)),
            ]
        );
        assert!(region.is_empty());
        assert_eq!(h.registry.id_keys().key_for(5), Some(fresh.key));
        assert!(h.registry.documents().get(5).is_some());
        assert_eq!(
            h.events.events.lock().unwrap()[0].kind,
            MessageKind::RefreshByInstance(5)
        );
        assert_eq!(h.store.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn refresh_clears_domains_after_rebuilding_projection() {
        let h = harness(FakeStore::with(vec![doc(1, None), doc(2, Some(1))]));

        h.refresher.refresh(1);

        let rebuilt = h.recorder.position(&RefreshStep::RebuildDocument(1));
        let cleared = h.recorder.position(&RefreshStep::ClearDomainCache);
        assert!(rebuilt.is_some());
        assert!(cleared > rebuilt);
        assert_eq!(h.registry.sort_order().children_of(Some(1)), vec![2]);
        assert!(h.registry.documents().get(1).is_some());
        assert!(h.registry.preview().get(1).is_some());
    }

    #[test]
    fn refresh_of_missing_document_drops_entries() {
        let registry = Arc::new(CacheRegistry::default());
        let events = Arc::new(EventBus::new());
        let populated = ContentRefresher::new(
            registry.clone(),
            Arc::new(FakeStore::with(vec![doc(4, None)])),
            events.clone(),
        );
        populated.refresh(4);
        assert!(registry.documents().get(4).is_some());

        let emptied = ContentRefresher::new(registry.clone(), Arc::new(FakeStore::default()), events);
        let report = emptied.refresh(4);

        assert!(report.is_clean());
        assert!(registry.documents().get(4).is_none());
        assert!(registry.preview().get(4).is_none());
        assert_eq!(registry.sort_order().parent_of(4), None);
    }

    #[test]
    fn refresh_all_runs_full_wipe_in_order() {
        let h = harness(FakeStore::default());
        h.registry.id_keys().register(1, Uuid::from_u128(1));
        content_region(&h.registry).insert_content(doc(1, None));

        h.refresher.refresh_all();

        assert_eq!(
            h.recorder.steps(),
            vec![
                RefreshStep::ClearIdKeyMap,
                RefreshStep::WipeRegion(EntityType::Content),
                RefreshStep::WipeRegion(EntityType::PublicAccessEntry),
                RefreshStep::ClearDomainCache,
                RefreshStep::ClearAllPreview,
                RefreshStep::RaiseEvent(MessageKind::RefreshAll),
            ]
        );
        assert!(h.registry.id_keys().is_empty());
        assert!(content_region(&h.registry).is_empty());
    }

    #[test]
    fn payload_clears_domains_once_after_all_records() {
        let h = harness(FakeStore::with(vec![doc(1, None)]));
        let raw = r#"[{"Id":1,"Key":null,"Operation":1},{"Id":2,"Key":null,"Operation":0}]"#;

        let report = h.refresher.refresh_payload(raw);

        assert!(report.is_clean());
        assert_eq!(h.registry.domains().generation(), 1);
        assert_eq!(h.recorder.count(&RefreshStep::ClearDomainCache), 1);
        assert_eq!(
            h.recorder.count(&RefreshStep::WipeRegion(EntityType::PublicAccessEntry)),
            1
        );
        let domain_clear = h.recorder.position(&RefreshStep::ClearDomainCache);
        assert!(domain_clear > h.recorder.position(&RefreshStep::ClearPreview(2)));
        assert!(domain_clear > h.recorder.position(&RefreshStep::RebuildDocument(1)));

        let events = h.events.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, MessageKind::RefreshByPayload);
        assert_eq!(events[0].payload.as_deref(), Some(raw));
    }

    #[test]
    fn payload_replay_is_idempotent() {
        let h = harness(FakeStore::with(vec![doc(1, None), doc(2, Some(1))]));
        let raw = r#"[{"Id":2,"Operation":1},{"Id":9,"Operation":0}]"#;

        h.refresher.refresh_payload(raw);
        let once = (
            h.registry.documents().get(2).map(|p| p.url.clone()),
            h.registry.preview().len(),
            h.registry.sort_order().parent_of(2),
            h.registry.id_keys().len(),
        );
        h.refresher.refresh_payload(raw);
        let twice = (
            h.registry.documents().get(2).map(|p| p.url.clone()),
            h.registry.preview().len(),
            h.registry.sort_order().parent_of(2),
            h.registry.id_keys().len(),
        );

        assert_eq!(once, twice);
    }

    #[test]
    fn malformed_payload_touches_nothing() {
        let h = harness(FakeStore::default());
        let region = content_region(&h.registry);
        region.insert_content(doc(5, None));

        let report = h.refresher.refresh_payload("{not json");

        assert!(report.rejected.is_some());
        assert_eq!(report.steps_run, 0);
        assert!(region.contains(&RegionKey::Id(5)));
        assert_eq!(h.registry.domains().generation(), 0);
        assert!(h.events.events.lock().unwrap().is_empty());
    }

    #[test]
    fn failing_store_step_is_reported_and_sequence_continues() {
        let store = FakeStore {
            fail_children: true,
            ..FakeStore::with(vec![doc(1, None)])
        };
        let h = harness(store);

        let report = h.refresher.refresh(1);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].step, RefreshStep::UpdateSortOrder(1));
        assert!(h.registry.documents().get(1).is_some());
        assert_eq!(h.registry.domains().generation(), 1);
    }

    #[test]
    fn access_rule_region_is_wiped_on_refresh() {
        let h = harness(FakeStore::with(vec![doc(1, None)]));
        let rules = h
            .registry
            .lookup(EntityType::PublicAccessEntry)
            .expect("access rule region is configured by default");
        rules.insert(RegionKey::Id(1), CachedEntry::AccessRules(Arc::new(Vec::new())));

        h.refresher.refresh(1);

        assert!(rules.is_empty());
    }

    #[test]
    fn execute_dispatches_by_operation() {
        let h = harness(FakeStore::default());
        h.refresher.execute(OperationKind::RefreshAll);
        h.refresher.execute(OperationKind::Remove(3));

        let kinds: Vec<MessageKind> = h
            .events
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.kind.clone())
            .collect();
        assert_eq!(kinds, vec![MessageKind::RefreshAll, MessageKind::RemoveById(3)]);
        assert_eq!(h.refresher.id(), CONTENT_REFRESHER_ID);
    }
}
