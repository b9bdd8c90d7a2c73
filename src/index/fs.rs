//! Filesystem index provider.
//!
//! ```text
//! <root>/
//! +-- reverse/
//! |   +-- a.json … z.json, 0-9.json, other.json
//! +-- bitset/
//!     +-- meta.json
//!     +-- ids.json
//!     +-- bucket-0.json, bucket-1.json, …
//! ```

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::provider::{BitsetBucketRecord, BitsetMeta, IdTableRecord, IndexProvider, ReverseShardRecord};
use super::ShardKey;
use crate::{Error, Result};

/// Reads JSON records from a directory tree.
#[derive(Debug, Clone)]
pub struct FsIndexProvider {
    root: PathBuf,
}

impl FsIndexProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn reverse_shard_path(&self, key: ShardKey) -> PathBuf {
        self.root.join("reverse").join(format!("{}.json", key.file_stem()))
    }

    pub fn bitset_meta_path(&self) -> PathBuf {
        self.root.join("bitset").join("meta.json")
    }

    pub fn bitset_ids_path(&self) -> PathBuf {
        self.root.join("bitset").join("ids.json")
    }

    pub fn bitset_bucket_path(&self, bucket: u32) -> PathBuf {
        self.root.join("bitset").join(format!("bucket-{bucket}.json"))
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Error::Index(format!("{}: {e}", path.display())))
    }
}

#[async_trait]
impl IndexProvider for FsIndexProvider {
    async fn load_reverse_shard(&self, key: ShardKey) -> Result<Option<ReverseShardRecord>> {
        Self::read_json(&self.reverse_shard_path(key)).await
    }

    async fn load_bitset_meta(&self) -> Result<Option<BitsetMeta>> {
        Self::read_json(&self.bitset_meta_path()).await
    }

    async fn load_bitset_ids(&self) -> Result<Option<IdTableRecord>> {
        Self::read_json(&self.bitset_ids_path()).await
    }

    async fn load_bitset_bucket(&self, bucket: u32) -> Result<Option<BitsetBucketRecord>> {
        Self::read_json(&self.bitset_bucket_path(bucket)).await
    }
}
