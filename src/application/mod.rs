//! Application services layer: node wiring, read-through access, errors.

pub mod context;
pub mod error;
pub mod reader;
pub mod repos;
