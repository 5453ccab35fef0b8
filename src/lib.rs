//! cachewire: cluster-wide cache invalidation for a content store.
//!
//! A content change is encoded as a small payload, broadcast to every node,
//! and replayed on each node as an ordered sequence of cache-layer
//! invalidations.

pub mod application;
pub mod cache;
pub mod cluster;
pub mod config;
pub mod domain;
pub mod infra;
pub mod refresher;
pub mod render;
pub mod search;
