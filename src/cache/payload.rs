//! Change payload codec.
//!
//! Wire form is a JSON array of `{"Id": int, "Key": uuid|null, "Operation": 0|1}`.
//! Missing keys decode as `None`; unknown fields are ignored.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::ContentIdentity;
use crate::domain::{ContentId, UNASSIGNED_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Operation {
    Deleted,
    Refresh,
}

impl From<Operation> for u8 {
    fn from(operation: Operation) -> Self {
        match operation {
            Operation::Deleted => 0,
            Operation::Refresh => 1,
        }
    }
}

impl TryFrom<u8> for Operation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Operation::Deleted),
            1 => Ok(Operation::Refresh),
            other => Err(format!("unknown operation `{other}`")),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Deleted => f.write_str("deleted"),
            Operation::Refresh => f.write_str("refresh"),
        }
    }
}

/// One entity's change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeRecord {
    pub id: ContentId,
    #[serde(default)]
    pub key: Option<Uuid>,
    pub operation: Operation,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("malformed change payload: {reason}")]
    Malformed { reason: String },
}

impl PayloadError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// Encode `entities` as a payload applying `operation` to each, in input order.
pub fn serialize<E: ContentIdentity>(
    operation: Operation,
    entities: &[E],
) -> Result<String, PayloadError> {
    let records: Vec<ChangeRecord> = entities
        .iter()
        .map(|entity| ChangeRecord {
            id: entity.content_id(),
            key: entity.content_key(),
            operation,
        })
        .collect();
    encode(&records)
}

/// Encode a pure-id deletion, for purges where no key is at hand.
pub fn serialize_deletion(ids: &[ContentId]) -> Result<String, PayloadError> {
    let records: Vec<ChangeRecord> = ids
        .iter()
        .map(|id| ChangeRecord {
            id: *id,
            key: None,
            operation: Operation::Deleted,
        })
        .collect();
    encode(&records)
}

pub fn deserialize(payload: &str) -> Result<Vec<ChangeRecord>, PayloadError> {
    let records: Vec<ChangeRecord> =
        serde_json::from_str(payload).map_err(|err| PayloadError::malformed(err.to_string()))?;

    if let Some(position) = records.iter().position(|r| r.id == UNASSIGNED_ID) {
        return Err(PayloadError::malformed(format!(
            "record {position} has no content id"
        )));
    }
    Ok(records)
}

fn encode(records: &[ChangeRecord]) -> Result<String, PayloadError> {
    if records.iter().any(|r| r.id == UNASSIGNED_ID) {
        return Err(PayloadError::malformed("cannot encode a record without id"));
    }
    serde_json::to_string(records).map_err(|err| PayloadError::malformed(err.to_string()))
}
