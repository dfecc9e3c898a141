//! Read cache for latency-sensitive single-contact lookups.

pub mod contact_cache;

pub use contact_cache::{CacheEntry, CachedContact, ContactCache};
