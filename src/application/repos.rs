//! Repository traits describing the content store the refresher reads from.

use thiserror::Error;

use crate::domain::ContentId;
use uuid::Uuid;

use crate::domain::entities::{AccessRule, ContentDocument, DomainRoute};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("store timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Read access to the content repository.
///
/// Invalidation replays synchronously on the notifying thread, so the store
/// is expected to answer from local storage without network round trips.
pub trait ContentStore: Send + Sync {
    fn find_by_id(&self, id: ContentId) -> Result<Option<ContentDocument>, RepoError>;

    fn find_by_key(&self, key: Uuid) -> Result<Option<ContentDocument>, RepoError>;

    /// Direct children of `id`, in any order.
    fn children_of(&self, id: ContentId) -> Result<Vec<ContentDocument>, RepoError>;

    /// Access rules protecting `id` or any of its ancestors.
    fn access_rules_for(&self, id: ContentId) -> Result<Vec<AccessRule>, RepoError>;

    fn find_domain(&self, host: &str) -> Result<Option<DomainRoute>, RepoError>;
}
