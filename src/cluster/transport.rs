//! Transport seam between cluster members.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, Weak};

use async_trait::async_trait;
use tracing::debug;

use crate::cache::{rw_read, rw_write};

use super::coordinator::DistributedCache;
use super::error::TransportError;
use super::message::{Ack, Envelope};

const SOURCE: &str = "cluster::transport";

/// Delivers one envelope to one peer and returns its acknowledgement.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    async fn deliver(&self, peer: &str, envelope: &Envelope) -> Result<Ack, TransportError>;
}

/// In-process cluster: peers are coordinators attached under a name.
#[derive(Default)]
pub struct LoopbackHub {
    nodes: RwLock<HashMap<String, Weak<DistributedCache>>>,
    offline: RwLock<HashSet<String>>,
}

impl LoopbackHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attach(&self, name: impl Into<String>, node: &Arc<DistributedCache>) {
        rw_write(&self.nodes, SOURCE, "attach").insert(name.into(), Arc::downgrade(node));
    }

    /// Make deliveries to `name` fail until brought back online.
    pub fn set_offline(&self, name: &str, offline: bool) {
        let mut set = rw_write(&self.offline, SOURCE, "set_offline");
        if offline {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }
}

#[async_trait]
impl ClusterTransport for LoopbackHub {
    async fn deliver(&self, peer: &str, envelope: &Envelope) -> Result<Ack, TransportError> {
        if rw_read(&self.offline, SOURCE, "deliver").contains(peer) {
            return Err(TransportError::unreachable(peer, "peer is offline"));
        }
        let node = rw_read(&self.nodes, SOURCE, "deliver")
            .get(peer)
            .and_then(Weak::upgrade)
            .ok_or_else(|| TransportError::unreachable(peer, "no such loopback node"))?;

        debug!(peer, message_id = %envelope.message_id, "Loopback delivery");
        Ok(node.receive(envelope.clone()).ack)
    }
}
