//! # Persisted Indexes
//!
//! Two read-mostly indexes over the reverse-dependency graph, both loaded
//! lazily from an `IndexProvider` and cached for the life of the store:
//!
//! | Index | Unit of loading | Answers |
//! |-------|-----------------|---------|
//! | `ReverseDependencyIndex` | shard (first character class) | name → dependent names |
//! | `BitsetIndex` | bucket (ID range) | name → sorted dependent IDs |
//!
//! One `IndexStore` is built at startup and injected into the engine. There
//! is no global cache.

pub mod shard;
pub mod provider;
pub mod fs;
pub mod memory;
pub mod reverse;
pub mod bitset;

use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use shard::ShardKey;
pub use provider::{
    IndexProvider, ReverseShardRecord, BitsetEntry, BitsetBucketRecord, IdTableRecord, BitsetMeta,
};
pub use fs::FsIndexProvider;
pub use memory::MemoryIndexProvider;
pub use reverse::{ReverseDependencyIndex, DependentSet};
pub use bitset::BitsetIndex;

/// The process-wide index handle.
pub struct IndexStore {
    reverse: ReverseDependencyIndex,
    bitset: BitsetIndex,
}

impl IndexStore {
    pub fn new(provider: Arc<dyn IndexProvider>) -> Self {
        Self {
            reverse: ReverseDependencyIndex::new(Arc::clone(&provider)),
            bitset: BitsetIndex::new(provider),
        }
    }

    /// A store with no persisted data; every lookup misses.
    pub fn empty() -> Self {
        Self::new(Arc::new(MemoryIndexProvider::new()))
    }

    pub fn reverse(&self) -> &ReverseDependencyIndex {
        &self.reverse
    }

    pub fn bitset(&self) -> &BitsetIndex {
        &self.bitset
    }

    /// Generation time recorded in the bitset metadata, if any.
    pub async fn data_as_of(&self) -> Option<DateTime<Utc>> {
        self.bitset.generated_at().await
    }
}
