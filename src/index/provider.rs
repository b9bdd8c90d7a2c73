//! # Index Provider Trait
//!
//! Where persisted index records come from. Each method returns
//! `Ok(None)` when the record does not exist and `Err` when it exists but
//! could not be read or parsed.
//!
//! ## Record shapes
//!
//! | Record | JSON |
//! |--------|------|
//! | reverse shard | `{"name": ["dependent", ...], ...}` |
//! | bitset bucket | `[{"id": 7, "dependents": [1, 4, 9]}, ...]` |
//! | id table | `{"name": 7, ...}` |
//! | metadata | `{"totalEntries": 1200, "bucketSize": 500, "generatedAt": "..."}` |

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ShardKey;
use crate::Result;

/// Normalized name → dependent names, for one shard.
pub type ReverseShardRecord = HashMap<String, Vec<String>>;

/// Normalized name → dense bitset ID.
pub type IdTableRecord = HashMap<String, u32>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitsetEntry {
    pub id: u32,
    pub dependents: Vec<u32>,
}

/// All entries whose ID falls in one bucket's range.
pub type BitsetBucketRecord = Vec<BitsetEntry>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitsetMeta {
    pub total_entries: u32,
    pub bucket_size: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
}

impl BitsetMeta {
    /// Bucket holding `id`.
    pub fn bucket_of(&self, id: u32) -> u32 {
        id / self.bucket_size.max(1)
    }

    pub fn bucket_count(&self) -> u32 {
        self.total_entries.div_ceil(self.bucket_size.max(1))
    }
}

/// Source of persisted index records.
#[async_trait]
pub trait IndexProvider: Send + Sync + 'static {
    async fn load_reverse_shard(&self, key: ShardKey) -> Result<Option<ReverseShardRecord>>;

    async fn load_bitset_meta(&self) -> Result<Option<BitsetMeta>>;

    async fn load_bitset_ids(&self) -> Result<Option<IdTableRecord>>;

    async fn load_bitset_bucket(&self, bucket: u32) -> Result<Option<BitsetBucketRecord>>;
}
