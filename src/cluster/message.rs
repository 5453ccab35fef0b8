//! Envelopes exchanged between cluster members.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ContentId;
use crate::refresher::OperationKind;

/// Stable name of a cluster member, used for logging and loop detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    RefreshAll,
    RefreshByIds { ids: Vec<ContentId> },
    RemoveByIds { ids: Vec<ContentId> },
    RefreshByPayload { payload: String },
}

impl WireMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            WireMessage::RefreshAll => "refresh_all",
            WireMessage::RefreshByIds { .. } => "refresh_by_ids",
            WireMessage::RemoveByIds { .. } => "remove_by_ids",
            WireMessage::RefreshByPayload { .. } => "refresh_by_payload",
        }
    }

    /// Refresher operations this message expands to, in order.
    pub fn operations(&self) -> Vec<OperationKind> {
        match self {
            WireMessage::RefreshAll => vec![OperationKind::RefreshAll],
            WireMessage::RefreshByIds { ids } => {
                ids.iter().map(|id| OperationKind::Refresh(*id)).collect()
            }
            WireMessage::RemoveByIds { ids } => {
                ids.iter().map(|id| OperationKind::Remove(*id)).collect()
            }
            WireMessage::RefreshByPayload { payload } => {
                vec![OperationKind::RefreshByPayload(payload.clone())]
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: Uuid,
    pub origin: NodeId,
    pub refresher_id: Uuid,
    pub message: WireMessage,
}

impl Envelope {
    pub fn new(origin: NodeId, refresher_id: Uuid, message: WireMessage) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            origin,
            refresher_id,
            message,
        }
    }
}

/// Receiver's answer to an inbound envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ack {
    Applied,
    Duplicate,
    UnknownRefresher,
}

impl Ack {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ack::Applied => "applied",
            Ack::Duplicate => "duplicate",
            Ack::UnknownRefresher => "unknown_refresher",
        }
    }
}
