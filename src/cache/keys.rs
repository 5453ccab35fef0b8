//! Cache key definitions.
//!
//! Defines `EntityType` for isolated regions and `RegionKey` for entries inside them.

use std::fmt;

use serde::Deserialize;
use uuid::Uuid;

use crate::domain::ContentId;

/// Entity type owning an isolated cache region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// Content items, addressed by local id and by global key.
    Content,
    /// Public access rules. Always wiped wholesale.
    PublicAccessEntry,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Content => "content",
            EntityType::PublicAccessEntry => "public_access_entry",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of one entry inside an isolated region.
///
/// The same item is usually cached under both forms; the two can diverge
/// between nodes, so invalidation purges both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKey {
    Id(ContentId),
    Key(Uuid),
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionKey::Id(id) => write!(f, "id:{id}"),
            RegionKey::Key(key) => write!(f, "key:{key}"),
        }
    }
}
