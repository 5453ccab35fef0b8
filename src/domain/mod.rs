//! Domain layer types and invariants.

pub mod entities;
pub mod error;

/// Integer primary key of a content item in the local store.
///
/// Local ids may diverge between nodes; the globally unique key does not.
pub type ContentId = i32;

/// The default id never identifies a stored item.
pub const UNASSIGNED_ID: ContentId = 0;
