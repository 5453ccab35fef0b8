//! Cache configuration.
//!
//! Controls which isolated regions exist and how large each layer may grow.

use std::num::NonZeroUsize;

use serde::Deserialize;

use super::keys::EntityType;

const DEFAULT_CONTENT_REGION_LIMIT: usize = 2000;
const DEFAULT_ACCESS_RULE_REGION_LIMIT: usize = 500;
const DEFAULT_PREVIEW_LIMIT: usize = 1000;
const DEFAULT_DOCUMENT_LIMIT: usize = 5000;
const DEFAULT_DOMAIN_LIMIT: usize = 256;

/// Cache configuration from the `[cache]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Isolated regions created at startup. Clears against a missing region are no-ops.
    pub regions: Vec<EntityType>,
    /// Maximum entries in the content region (ids and keys combined).
    pub content_region_limit: usize,
    /// Maximum entries in the access-rule region.
    pub access_rule_region_limit: usize,
    /// Maximum preview entries.
    pub preview_limit: usize,
    /// Maximum published document projections.
    pub document_limit: usize,
    /// Maximum cached domain routes.
    pub domain_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            regions: vec![EntityType::Content, EntityType::PublicAccessEntry],
            content_region_limit: DEFAULT_CONTENT_REGION_LIMIT,
            access_rule_region_limit: DEFAULT_ACCESS_RULE_REGION_LIMIT,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            document_limit: DEFAULT_DOCUMENT_LIMIT,
            domain_limit: DEFAULT_DOMAIN_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            regions: settings.regions.clone(),
            content_region_limit: settings.content_region_limit,
            access_rule_region_limit: settings.access_rule_region_limit,
            preview_limit: settings.preview_limit,
            document_limit: settings.document_limit,
            domain_limit: settings.domain_limit,
        }
    }
}

impl CacheConfig {
    /// Capacity of the isolated region for `entity_type`, clamped to at least one.
    pub fn region_limit(&self, entity_type: EntityType) -> NonZeroUsize {
        let limit = match entity_type {
            EntityType::Content => self.content_region_limit,
            EntityType::PublicAccessEntry => self.access_rule_region_limit,
        };
        non_zero(limit)
    }

    pub fn preview_limit_non_zero(&self) -> NonZeroUsize {
        non_zero(self.preview_limit)
    }

    pub fn document_limit_non_zero(&self) -> NonZeroUsize {
        non_zero(self.document_limit)
    }

    pub fn domain_limit_non_zero(&self) -> NonZeroUsize {
        non_zero(self.domain_limit)
    }
}

fn non_zero(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).unwrap_or(NonZeroUsize::MIN)
}
