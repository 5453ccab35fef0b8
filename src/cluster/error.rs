use thiserror::Error;

use crate::cache::PayloadError;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer `{peer}` unreachable: {message}")]
    Unreachable { peer: String, message: String },
    #[error("peer `{peer}` rejected the envelope with status {status}")]
    Rejected { peer: String, status: u16 },
    #[error("peer `{peer}` returned an unreadable acknowledgement: {message}")]
    InvalidAck { peer: String, message: String },
}

impl TransportError {
    pub fn unreachable(peer: &str, err: impl std::fmt::Display) -> Self {
        Self::Unreachable {
            peer: peer.to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("delivery to `{peer}` failed after {attempts} attempt(s)")]
    Delivery {
        peer: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },
    #[error(transparent)]
    Payload(#[from] PayloadError),
}
