//! Cluster distribution of cache notifications.

mod config;
mod coordinator;
mod dedupe;
mod error;
mod message;
mod transport;

pub use config::ClusterConfig;
pub use coordinator::{BroadcastReport, DistributedCache, PeerDelivery, Receipt};
pub use dedupe::SeenMessages;
pub use error::{ClusterError, TransportError};
pub use message::{Ack, Envelope, NodeId, WireMessage};
pub use transport::{ClusterTransport, LoopbackHub};

pub(crate) use coordinator::{METRIC_DELIVERY, METRIC_DUPLICATE};
