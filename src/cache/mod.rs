//! Node-local cache layers.
//!
//! - **Isolated regions**: per entity type, addressed by id or key
//! - **Id/key map**: local id to global key lookups
//! - **Preview**: draft view of each item
//! - **Sort order**: ordered children per parent
//! - **Documents**: published runtime projection
//! - **Domains**: host to content-root routing
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! regions = ["content", "public_access_entry"]
//! content_region_limit = 2000
//! # ... see config.rs for all options
//! ```

mod config;
mod documents;
mod domains;
mod events;
mod idkeys;
mod keys;
mod lock;
pub mod payload;
mod preview;
mod registry;
mod sort_order;
mod store;

pub use config::CacheConfig;
pub use documents::{DocumentCache, PublishedContent};
pub use domains::DomainCache;
pub use events::{CacheUpdated, CacheUpdatedSubscriber, Epoch, EventBus, MessageKind};
pub use idkeys::IdKeyMap;
pub use keys::{EntityType, RegionKey};
pub use payload::{ChangeRecord, Operation, PayloadError};
pub use preview::{PreviewCache, PreviewEntry};
pub use registry::CacheRegistry;
pub use sort_order::SortOrderIndex;
pub use store::{CachedEntry, IsolatedRegion};

pub(crate) use lock::{mutex_lock, rw_read, rw_write};
pub(crate) use store::{METRIC_REGION_CLEAR, METRIC_REGION_HIT, METRIC_REGION_MISS};
