//! Domain entities mirrored from the content store.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ContentId;
use super::error::DomainError;

/// A content item as loaded from the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDocument {
    pub id: ContentId,
    pub key: Uuid,
    #[serde(default)]
    pub parent_id: Option<ContentId>,
    #[serde(default)]
    pub level: u16,
    #[serde(default)]
    pub sort_order: i32,
    pub name: String,
    #[serde(default)]
    pub url_segment: String,
    #[serde(default)]
    pub template_id: Option<i32>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub version: u32,
}

impl ContentDocument {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.id == super::UNASSIGNED_ID {
            return Err(DomainError::validation(format!(
                "content `{}` has no id",
                self.name
            )));
        }
        if self.parent_id == Some(self.id) {
            return Err(DomainError::validation(format!(
                "content `{}` cannot be its own parent",
                self.id
            )));
        }
        Ok(())
    }
}

/// Entity identity used when building change payloads.
pub trait ContentIdentity {
    fn content_id(&self) -> ContentId;
    fn content_key(&self) -> Option<Uuid>;
}

impl ContentIdentity for ContentDocument {
    fn content_id(&self) -> ContentId {
        self.id
    }

    fn content_key(&self) -> Option<Uuid> {
        Some(self.key)
    }
}

/// Public access rule protecting a content subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    pub id: Uuid,
    pub protected_node_id: ContentId,
    #[serde(default)]
    pub allowed_groups: Vec<String>,
}

/// Hostname binding resolved to a content root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRoute {
    pub host: String,
    pub root_id: ContentId,
}
