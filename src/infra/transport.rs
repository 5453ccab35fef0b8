//! HTTP/JSON transport between cluster nodes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::cluster::{Ack, ClusterTransport, Envelope, TransportError};

use super::error::InfraError;
use super::http::{MESSAGES_PATH, ReceiptBody};

/// Posts envelopes to `{peer}/cluster/messages`.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::transport("cluster", err))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

pub(crate) fn endpoint(peer: &str, path: &str) -> String {
    format!("{}{path}", peer.trim_end_matches('/'))
}

#[async_trait]
impl ClusterTransport for HttpTransport {
    async fn deliver(&self, peer: &str, envelope: &Envelope) -> Result<Ack, TransportError> {
        let url = endpoint(peer, MESSAGES_PATH);
        let response = self
            .client
            .post(&url)
            .json(envelope)
            .send()
            .await
            .map_err(|err| TransportError::unreachable(peer, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected {
                peer: peer.to_string(),
                status: status.as_u16(),
            });
        }

        let body: ReceiptBody =
            response
                .json()
                .await
                .map_err(|err| TransportError::InvalidAck {
                    peer: peer.to_string(),
                    message: err.to_string(),
                })?;
        debug!(peer, message_id = %body.message_id, ack = body.ack.as_str(), "Peer acknowledged");
        Ok(body.ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        assert_eq!(
            endpoint("http://node-b:4100/", MESSAGES_PATH),
            "http://node-b:4100/cluster/messages"
        );
        assert_eq!(
            endpoint("http://node-b:4100", "/cluster/publish"),
            "http://node-b:4100/cluster/publish"
        );
    }
}
