//! Cache primitives
//!
//! Building blocks shared by the response and GraphQL caches in the access
//! layer: a bounded LRU store and canonical JSON keys.

pub mod key;
pub mod lru;

pub use key::{canonical_json, hash_json};
pub use lru::{LruCache, LruStats};
