//! The cache & provenance store.
//!
//! Maps (item, scope key, fingerprint) to a materialized result. The store
//! is append-only: a fingerprint change creates a new entry and never
//! mutates history, so past provenance stays inspectable. `commit` is
//! idempotent under concurrent duplicate completions, and a result clash
//! under an identical key fails loudly instead of overwriting.

pub mod entry;
pub mod error;
pub mod fs;
pub mod memory;
pub mod store;

pub use self::{
    entry::{CacheEntry, CacheKey, StoredResult},
    error::CacheError,
    fs::FsCacheStore,
    memory::MemoryCacheStore,
    store::CacheStore,
};
