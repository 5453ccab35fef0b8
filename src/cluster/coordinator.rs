//! Cluster fan-out and inbound dispatch.

use std::sync::Arc;

use futures::future::join_all;
use metrics::counter;
use tokio::time::sleep;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::cache::Operation;
use crate::cache::payload;
use crate::domain::ContentId;
use crate::domain::entities::ContentIdentity;
use crate::refresher::{RefreshReport, RefresherCollection};

use super::config::ClusterConfig;
use super::dedupe::SeenMessages;
use super::error::ClusterError;
use super::message::{Ack, Envelope, NodeId, WireMessage};
use super::transport::ClusterTransport;

pub(crate) const METRIC_DELIVERY: &str = "cachewire_cluster_delivery_total";
pub(crate) const METRIC_DUPLICATE: &str = "cachewire_cluster_duplicate_total";

/// Local outcome of an envelope.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub message_id: Uuid,
    pub ack: Ack,
    pub reports: Vec<RefreshReport>,
}

impl Receipt {
    pub fn failed_steps(&self) -> usize {
        self.reports.iter().map(|r| r.failures.len()).sum()
    }

    pub fn rejected(&self) -> Option<&str> {
        self.reports.iter().find_map(|r| r.rejected.as_deref())
    }
}

#[derive(Debug)]
pub struct PeerDelivery {
    pub peer: String,
    pub attempts: u32,
    pub outcome: Result<Ack, ClusterError>,
}

#[derive(Debug)]
pub struct BroadcastReport {
    pub local: Receipt,
    pub deliveries: Vec<PeerDelivery>,
}

impl BroadcastReport {
    pub fn message_id(&self) -> Uuid {
        self.local.message_id
    }

    pub fn failed_peers(&self) -> Vec<&str> {
        self.deliveries
            .iter()
            .filter(|d| d.outcome.is_err())
            .map(|d| d.peer.as_str())
            .collect()
    }

    pub fn all_delivered(&self) -> bool {
        self.deliveries.iter().all(|d| d.outcome.is_ok())
    }
}

/// Cluster-wide cache notification for one node.
///
/// A broadcast applies locally first, then reaches every peer. Inbound
/// envelopes are applied once per message id and never forwarded.
pub struct DistributedCache {
    config: ClusterConfig,
    refreshers: RefresherCollection,
    transport: Arc<dyn ClusterTransport>,
    seen: SeenMessages,
}

impl DistributedCache {
    pub fn new(
        config: ClusterConfig,
        refreshers: RefresherCollection,
        transport: Arc<dyn ClusterTransport>,
    ) -> Self {
        let seen = SeenMessages::new(config.dedupe_window);
        Self {
            config,
            refreshers,
            transport,
            seen,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.config.node_id
    }

    pub fn peers(&self) -> &[String] {
        &self.config.peers
    }

    pub fn refreshers(&self) -> &RefresherCollection {
        &self.refreshers
    }

    pub async fn refresh_all(&self, refresher_id: Uuid) -> BroadcastReport {
        self.broadcast(refresher_id, WireMessage::RefreshAll).await
    }

    pub async fn refresh_by_ids(&self, refresher_id: Uuid, ids: &[ContentId]) -> BroadcastReport {
        self.broadcast(refresher_id, WireMessage::RefreshByIds { ids: ids.to_vec() })
            .await
    }

    pub async fn remove_by_ids(&self, refresher_id: Uuid, ids: &[ContentId]) -> BroadcastReport {
        self.broadcast(refresher_id, WireMessage::RemoveByIds { ids: ids.to_vec() })
            .await
    }

    pub async fn refresh_by_payload(&self, refresher_id: Uuid, payload: String) -> BroadcastReport {
        self.broadcast(refresher_id, WireMessage::RefreshByPayload { payload })
            .await
    }

    /// Encode `entities` as a change batch and broadcast it.
    pub async fn refresh_changes<E: ContentIdentity>(
        &self,
        refresher_id: Uuid,
        operation: Operation,
        entities: &[E],
    ) -> Result<BroadcastReport, ClusterError> {
        let payload = payload::serialize(operation, entities)?;
        Ok(self.refresh_by_payload(refresher_id, payload).await)
    }

    /// Encode `ids` as a deletion batch and broadcast it.
    pub async fn remove_changes(
        &self,
        refresher_id: Uuid,
        ids: &[ContentId],
    ) -> Result<BroadcastReport, ClusterError> {
        let payload = payload::serialize_deletion(ids)?;
        Ok(self.refresh_by_payload(refresher_id, payload).await)
    }

    #[instrument(skip(self, message), fields(node = %self.config.node_id, kind = message.kind()))]
    pub async fn broadcast(&self, refresher_id: Uuid, message: WireMessage) -> BroadcastReport {
        let envelope = Envelope::new(self.config.node_id.clone(), refresher_id, message);

        // Local replay goes through the inbound path so the id is marked seen
        // and an echo from a misconfigured peer list is ignored.
        let local = self.receive(envelope.clone());

        let deliveries = join_all(
            self.config
                .peers
                .iter()
                .map(|peer| self.deliver_with_retry(peer, &envelope)),
        )
        .await;

        let report = BroadcastReport { local, deliveries };
        let failed = report.failed_peers();
        if failed.is_empty() {
            info!(
                message_id = %envelope.message_id,
                peers = self.config.peers.len(),
                "Broadcast delivered"
            );
        } else {
            warn!(
                message_id = %envelope.message_id,
                failed_peers = ?failed,
                "Broadcast incomplete; affected peers stay stale until their next refresh"
            );
        }
        report
    }

    /// Apply an inbound envelope on this node.
    #[instrument(
        skip(self, envelope),
        fields(node = %self.config.node_id, message_id = %envelope.message_id, origin = %envelope.origin)
    )]
    pub fn receive(&self, envelope: Envelope) -> Receipt {
        let message_id = envelope.message_id;

        let Some(refresher) = self.refreshers.get(envelope.refresher_id) else {
            warn!(refresher_id = %envelope.refresher_id, "No refresher registered for envelope");
            return Receipt {
                message_id,
                ack: Ack::UnknownRefresher,
                reports: Vec::new(),
            };
        };

        if !self.seen.first_sighting(message_id) {
            counter!(METRIC_DUPLICATE).increment(1);
            info!("Duplicate envelope ignored");
            return Receipt {
                message_id,
                ack: Ack::Duplicate,
                reports: Vec::new(),
            };
        }

        let reports: Vec<RefreshReport> = envelope
            .message
            .operations()
            .into_iter()
            .map(|operation| refresher.execute(operation))
            .collect();

        info!(
            refresher = refresher.name(),
            kind = envelope.message.kind(),
            operations = reports.len(),
            "Envelope applied"
        );
        Receipt {
            message_id,
            ack: Ack::Applied,
            reports,
        }
    }

    async fn deliver_with_retry(&self, peer: &str, envelope: &Envelope) -> PeerDelivery {
        let max_attempts = self.config.delivery_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.transport.deliver(peer, envelope).await {
                Ok(ack) => {
                    counter!(METRIC_DELIVERY, "outcome" => "delivered").increment(1);
                    return PeerDelivery {
                        peer: peer.to_string(),
                        attempts: attempt,
                        outcome: Ok(ack),
                    };
                }
                Err(err) if attempt < max_attempts => {
                    counter!(METRIC_DELIVERY, "outcome" => "retried").increment(1);
                    warn!(peer, attempt, error = %err, "Peer delivery failed; retrying");
                    sleep(self.config.backoff_for(attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    counter!(METRIC_DELIVERY, "outcome" => "failed").increment(1);
                    warn!(peer, attempts = attempt, error = %err, "Peer delivery abandoned");
                    return PeerDelivery {
                        peer: peer.to_string(),
                        attempts: attempt,
                        outcome: Err(ClusterError::Delivery {
                            peer: peer.to_string(),
                            attempts: attempt,
                            source: err,
                        }),
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::refresher::{OperationKind, Refresher};

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<OperationKind>>,
    }

    const RECORDING_ID: Uuid = Uuid::from_u128(42);

    impl Refresher for Recording {
        fn id(&self) -> Uuid {
            RECORDING_ID
        }

        fn name(&self) -> &'static str {
            "recording"
        }

        fn execute(&self, operation: OperationKind) -> RefreshReport {
            let name = operation.name();
            self.seen.lock().unwrap().push(operation);
            RefreshReport::new(name)
        }
    }

    struct Flaky {
        failures_left: Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl ClusterTransport for Flaky {
        async fn deliver(
            &self,
            peer: &str,
            _envelope: &Envelope,
        ) -> Result<Ack, crate::cluster::TransportError> {
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                return Err(crate::cluster::TransportError::unreachable(peer, "boom"));
            }
            Ok(Ack::Applied)
        }
    }

    fn node(transport: Arc<dyn ClusterTransport>, peers: Vec<String>) -> (DistributedCache, Arc<Recording>) {
        let recording = Arc::new(Recording::default());
        let mut config = ClusterConfig::standalone("node-a").with_peers(peers);
        config.retry_backoff = Duration::from_millis(1);
        let cache = DistributedCache::new(
            config,
            RefresherCollection::new().with(recording.clone()),
            transport,
        );
        (cache, recording)
    }

    #[tokio::test]
    async fn broadcast_applies_locally_and_retries_peers() {
        let transport = Arc::new(Flaky {
            failures_left: Mutex::new(2),
        });
        let (cache, recording) = node(transport, vec!["peer-b".to_string()]);

        let report = cache.refresh_by_ids(RECORDING_ID, &[1, 2]).await;

        assert_eq!(report.local.ack, Ack::Applied);
        assert_eq!(
            *recording.seen.lock().unwrap(),
            vec![OperationKind::Refresh(1), OperationKind::Refresh(2)]
        );
        assert_eq!(report.deliveries.len(), 1);
        assert_eq!(report.deliveries[0].attempts, 3);
        assert!(report.all_delivered());
    }

    #[tokio::test]
    async fn exhausted_retries_are_reported_not_fatal() {
        let transport = Arc::new(Flaky {
            failures_left: Mutex::new(10),
        });
        let (cache, _) = node(transport, vec!["peer-b".to_string()]);

        let report = cache.refresh_all(RECORDING_ID).await;

        assert_eq!(report.local.ack, Ack::Applied);
        assert_eq!(report.failed_peers(), vec!["peer-b"]);
        assert!(matches!(
            report.deliveries[0].outcome,
            Err(ClusterError::Delivery { attempts: 3, .. })
        ));
    }

    #[test]
    fn duplicate_envelope_is_not_reapplied() {
        let transport = Arc::new(Flaky {
            failures_left: Mutex::new(0),
        });
        let (cache, recording) = node(transport, Vec::new());
        let envelope = Envelope::new(
            NodeId::new("node-b"),
            RECORDING_ID,
            WireMessage::RemoveByIds { ids: vec![9] },
        );

        assert_eq!(cache.receive(envelope.clone()).ack, Ack::Applied);
        assert_eq!(cache.receive(envelope).ack, Ack::Duplicate);
        assert_eq!(recording.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn unknown_refresher_is_acknowledged_as_such() {
        let transport = Arc::new(Flaky {
            failures_left: Mutex::new(0),
        });
        let (cache, recording) = node(transport, Vec::new());
        let envelope = Envelope::new(NodeId::new("node-b"), Uuid::nil(), WireMessage::RefreshAll);

        assert_eq!(cache.receive(envelope).ack, Ack::UnknownRefresher);
        assert!(recording.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_changes_encodes_deletion_payload() {
        let transport = Arc::new(Flaky {
            failures_left: Mutex::new(0),
        });
        let (cache, recording) = node(transport, Vec::new());

        cache
            .remove_changes(RECORDING_ID, &[5, 6])
            .await
            .expect("deletion payload encodes");

        let seen = recording.seen.lock().unwrap();
        let OperationKind::RefreshByPayload(raw) = &seen[0] else {
            panic!("expected payload operation, got {:?}", seen[0]);
        };
        let records = payload::deserialize(raw).expect("payload decodes");
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.operation == Operation::Deleted));
    }
}
