//! Multi-node convergence over the in-process loopback transport.

use std::sync::Arc;
use std::time::Duration;

use cachewire::application::context::{NodeBuilder, NodeContext};
use cachewire::cache::{CacheConfig, EntityType, Operation, RegionKey};
use cachewire::cluster::{Ack, ClusterConfig, Envelope, LoopbackHub, NodeId, WireMessage};
use cachewire::domain::ContentId;
use cachewire::domain::entities::ContentDocument;
use cachewire::infra::content_store::InMemoryContentStore;
use cachewire::refresher::CONTENT_REFRESHER_ID;
use cachewire::search::IndexHint;
use uuid::Uuid;

const NODES: [&str; 3] = ["node-a", "node-b", "node-c"];

fn doc(id: ContentId, parent_id: Option<ContentId>, name: &str) -> ContentDocument {
    ContentDocument {
        id,
        key: Uuid::from_u128(0x1000 + id as u128),
        parent_id,
        level: if parent_id.is_some() { 2 } else { 1 },
        sort_order: id,
        name: name.to_string(),
        url_segment: name.to_lowercase(),
        template_id: Some(1),
        published: true,
        version: 1,
    }
}

struct Cluster {
    hub: Arc<LoopbackHub>,
    store: Arc<InMemoryContentStore>,
    nodes: Vec<NodeContext>,
}

impl Cluster {
    /// Three nodes reading one shared store, the way they would share a database.
    fn start() -> Self {
        let hub = LoopbackHub::new();
        let store = Arc::new(InMemoryContentStore::new());
        store.upsert(doc(1, None, "Home")).expect("valid doc");
        store.upsert(doc(2, Some(1), "About")).expect("valid doc");

        let nodes: Vec<NodeContext> = NODES
            .iter()
            .map(|name| {
                let peers = NODES
                    .iter()
                    .filter(|peer| *peer != name)
                    .map(|peer| peer.to_string())
                    .collect();
                let mut cluster = ClusterConfig::standalone(*name).with_peers(peers);
                cluster.retry_backoff = Duration::from_millis(1);
                NodeBuilder::new(CacheConfig::default(), cluster, store.clone(), hub.clone())
                    .build()
            })
            .collect();

        for (name, node) in NODES.iter().zip(&nodes) {
            hub.attach(*name, &node.cluster);
        }

        Self { hub, store, nodes }
    }

    fn warm(&self, id: ContentId) {
        for node in &self.nodes {
            node.reader.by_id(id).expect("read succeeds");
        }
    }

    fn cached_name(&self, node: usize, id: ContentId) -> Option<String> {
        self.nodes[node]
            .registry
            .lookup(EntityType::Content)
            .and_then(|region| region.get(&RegionKey::Id(id)))
            .and_then(|entry| entry.as_content().map(|doc| doc.name.clone()))
    }
}

#[tokio::test]
async fn one_broadcast_converges_every_node() {
    let cluster = Cluster::start();
    cluster.warm(2);
    for node in 0..NODES.len() {
        assert_eq!(cluster.cached_name(node, 2).as_deref(), Some("About"));
    }

    let renamed = doc(2, Some(1), "Company");
    cluster.store.upsert(renamed.clone()).expect("valid doc");
    let report = cluster.nodes[0]
        .cluster
        .refresh_changes(CONTENT_REFRESHER_ID, Operation::Refresh, &[renamed])
        .await
        .expect("payload encodes");

    assert!(report.all_delivered());
    assert_eq!(report.deliveries.len(), 2);
    for node in &cluster.nodes {
        let fresh = node.reader.by_id(2).expect("read").expect("present");
        assert_eq!(fresh.name, "Company");
        assert_eq!(
            node.registry.documents().get(2).map(|p| p.name.clone()),
            Some("Company".to_string())
        );
        assert_eq!(node.registry.domains().generation(), 1);
        assert_eq!(node.index_hints.drain(10), vec![IndexHint::Reindex(2)]);
    }
}

#[tokio::test]
async fn removal_is_a_miss_on_every_node() {
    let cluster = Cluster::start();
    cluster.warm(2);
    cluster.store.delete(2);

    let report = cluster.nodes[1]
        .cluster
        .remove_by_ids(CONTENT_REFRESHER_ID, &[2])
        .await;

    assert!(report.all_delivered());
    for (index, node) in cluster.nodes.iter().enumerate() {
        assert_eq!(cluster.cached_name(index, 2), None);
        assert!(node.reader.by_id(2).expect("read").is_none());
        assert!(node.registry.id_keys().key_for(2).is_none());
        assert_eq!(node.index_hints.drain(10), vec![IndexHint::Delete(2)]);
    }
}

#[tokio::test]
async fn duplicate_envelope_is_acknowledged_and_not_reapplied() {
    let cluster = Cluster::start();
    let envelope = Envelope::new(
        NodeId::new("node-a"),
        CONTENT_REFRESHER_ID,
        WireMessage::RefreshByIds { ids: vec![1] },
    );

    let first = cluster.nodes[1].cluster.receive(envelope.clone());
    let second = cluster.nodes[1].cluster.receive(envelope);

    assert_eq!(first.ack, Ack::Applied);
    assert_eq!(first.reports.len(), 1);
    assert_eq!(second.ack, Ack::Duplicate);
    assert!(second.reports.is_empty());
    assert_eq!(cluster.nodes[1].registry.domains().generation(), 1);
}

#[tokio::test]
async fn unknown_refresher_is_acknowledged_without_changes() {
    let cluster = Cluster::start();
    cluster.warm(1);

    let receipt = cluster.nodes[0].cluster.receive(Envelope::new(
        NodeId::new("node-b"),
        Uuid::nil(),
        WireMessage::RefreshAll,
    ));

    assert_eq!(receipt.ack, Ack::UnknownRefresher);
    assert_eq!(cluster.cached_name(0, 1).as_deref(), Some("Home"));
}

#[tokio::test]
async fn malformed_payload_leaves_caches_untouched() {
    let cluster = Cluster::start();
    cluster.warm(1);

    let report = cluster.nodes[0]
        .cluster
        .refresh_by_payload(
            CONTENT_REFRESHER_ID,
            r#"[{"Id":0,"Key":null,"Operation":1}]"#.to_string(),
        )
        .await;

    assert!(report.local.rejected().is_some());
    for (index, node) in cluster.nodes.iter().enumerate() {
        assert_eq!(cluster.cached_name(index, 1).as_deref(), Some("Home"));
        assert_eq!(node.registry.domains().generation(), 0);
        assert!(node.index_hints.is_empty());
    }
}

#[tokio::test]
async fn offline_peer_is_reported_and_others_still_converge() {
    let cluster = Cluster::start();
    cluster.warm(1);
    cluster.hub.set_offline("node-c", true);

    let report = cluster.nodes[0]
        .cluster
        .refresh_all(CONTENT_REFRESHER_ID)
        .await;

    assert_eq!(report.failed_peers(), vec!["node-c"]);
    assert_eq!(cluster.cached_name(0, 1), None);
    assert_eq!(cluster.cached_name(1, 1), None);
    assert_eq!(cluster.cached_name(2, 1).as_deref(), Some("Home"));

    let failed = report
        .deliveries
        .iter()
        .find(|delivery| delivery.peer == "node-c")
        .expect("node-c delivery");
    assert_eq!(failed.attempts, 3);
}

#[tokio::test]
async fn replaying_a_payload_twice_matches_replaying_once() {
    let cluster = Cluster::start();
    let raw = r#"[{"Id":1,"Operation":1},{"Id":2,"Operation":0}]"#;
    let node = &cluster.nodes[2];
    let snapshot = || {
        (
            node.registry.documents().len(),
            node.registry.preview().len(),
            node.registry.sort_order().children_of(None),
            node.registry.id_keys().len(),
        )
    };

    cluster.nodes[0]
        .cluster
        .refresh_by_payload(CONTENT_REFRESHER_ID, raw.to_string())
        .await;
    let once = snapshot();

    cluster.nodes[0]
        .cluster
        .refresh_by_payload(CONTENT_REFRESHER_ID, raw.to_string())
        .await;
    let twice = snapshot();

    assert_eq!(once, twice);
    assert_eq!(once.0, 1);
}
