//! In-memory query cache for reference data.
//!
//! This module provides a source-agnostic caching mechanism that:
//! - Keys results by table, row limit and equality filters
//! - Expires entries lazily once their TTL has elapsed
//! - Bounds the entry count, evicting the oldest inserts first
//! - Drops every cached query for a table after a write to it

mod key;
mod layer;
mod store;
mod traits;

pub use key::{Filters, QueryKey};
pub use layer::CacheLayer;
pub use store::CacheConfig;
pub use traits::{CacheSource, CacheStats};
#[cfg(test)]
pub use traits::ManualClock;
