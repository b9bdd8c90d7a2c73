//! In-memory index provider.
//!
//! Holds records in HashMaps and counts how often each one is loaded, which
//! is how the single-load guarantee of the indexes is tested. Can persist
//! itself in the `FsIndexProvider` layout.
//!
//! ## Limitations
//!
//! - **Build, then share**: the builder methods take `&mut self`; wrap in an
//!   `Arc` only once populated.
//! - **IDs are assigned in insertion order** by `insert_bitset`.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::provider::{
    BitsetBucketRecord, BitsetEntry, BitsetMeta, IdTableRecord, IndexProvider, ReverseShardRecord,
};
use super::ShardKey;
use crate::model::PackageName;
use crate::{Error, Result};

// ============================================================================
// MemoryIndexProvider
// ============================================================================

pub struct MemoryIndexProvider {
    reverse: HashMap<ShardKey, ReverseShardRecord>,
    ids: IdTableRecord,
    buckets: HashMap<u32, BitsetBucketRecord>,
    bucket_size: u32,
    generated_at: Option<DateTime<Utc>>,
    failing_shards: HashSet<ShardKey>,
    load_delay: Option<Duration>,
    slow_records: HashMap<String, Duration>,
    /// record key ("reverse/a", "bitset/ids", …) → load count
    loads: Mutex<HashMap<String, u64>>,
}

impl Default for MemoryIndexProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndexProvider {
    pub fn new() -> Self {
        Self {
            reverse: HashMap::new(),
            ids: HashMap::new(),
            buckets: HashMap::new(),
            bucket_size: 1024,
            generated_at: None,
            failing_shards: HashSet::new(),
            load_delay: None,
            slow_records: HashMap::new(),
            loads: Mutex::new(HashMap::new()),
        }
    }

    /// Set the bitset bucket width. Call before any `insert_bitset`.
    pub fn with_bucket_size(mut self, bucket_size: u32) -> Self {
        self.bucket_size = bucket_size.max(1);
        self
    }

    pub fn with_generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }

    /// Sleep this long inside every load.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    /// Sleep `delay` inside loads of one record, keyed as in `load_count`.
    pub fn with_slow_record(mut self, key: &str, delay: Duration) -> Self {
        self.slow_records.insert(key.to_string(), delay);
        self
    }

    /// Make loads of `key` fail with an index error.
    pub fn fail_shard(&mut self, key: ShardKey) {
        self.failing_shards.insert(key);
    }

    /// Add a reverse-index entry. Names are normalized; the shard is chosen
    /// from the normalized name.
    pub fn insert_reverse<I, T>(&mut self, name: &str, dependents: I)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let Some(pkg) = PackageName::normalized(name) else { return };
        let entry = self
            .reverse
            .entry(ShardKey::of(&pkg))
            .or_default()
            .entry(pkg.to_string())
            .or_default();
        entry.extend(dependents.into_iter().map(|d| d.as_ref().to_string()));
    }

    /// Add a bitset entry, assigning IDs to any names not yet in the table.
    pub fn insert_bitset<I, T>(&mut self, name: &str, dependents: I)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let Some(pkg) = PackageName::normalized(name) else { return };
        let id = self.id_for(pkg.as_str());
        let dependent_ids: Vec<u32> = dependents
            .into_iter()
            .filter_map(|d| PackageName::normalized(d.as_ref()))
            .map(|d| self.id_for(d.as_str()))
            .collect();
        let bucket = id / self.bucket_size;
        self.buckets.entry(bucket).or_default().push(BitsetEntry {
            id,
            dependents: dependent_ids,
        });
    }

    /// Add the same entry to both indexes.
    pub fn insert_both<I, T>(&mut self, name: &str, dependents: I)
    where
        I: IntoIterator<Item = T> + Clone,
        T: AsRef<str>,
    {
        self.insert_reverse(name, dependents.clone());
        self.insert_bitset(name, dependents);
    }

    fn id_for(&mut self, name: &str) -> u32 {
        let next = self.ids.len() as u32;
        *self.ids.entry(name.to_string()).or_insert(next)
    }

    fn meta(&self) -> BitsetMeta {
        BitsetMeta {
            total_entries: self.ids.len() as u32,
            bucket_size: self.bucket_size,
            generated_at: self.generated_at,
        }
    }

    fn has_bitset(&self) -> bool {
        !self.ids.is_empty()
    }

    /// How many times the record under `key` was loaded.
    /// Keys: `reverse/<stem>`, `bitset/meta`, `bitset/ids`, `bitset/bucket-<n>`.
    pub fn load_count(&self, key: &str) -> u64 {
        self.loads.lock().get(key).copied().unwrap_or(0)
    }

    async fn record_load(&self, key: String) {
        let delay = self.load_delay.max(self.slow_records.get(&key).copied());
        *self.loads.lock().entry(key).or_insert(0) += 1;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Write every record in the `FsIndexProvider` layout under `root`.
    pub fn write_to_dir(&self, root: &Path) -> Result<()> {
        let reverse_dir = root.join("reverse");
        let bitset_dir = root.join("bitset");
        std::fs::create_dir_all(&reverse_dir)?;
        std::fs::create_dir_all(&bitset_dir)?;

        for (key, record) in &self.reverse {
            let path = reverse_dir.join(format!("{}.json", key.file_stem()));
            std::fs::write(path, serde_json::to_vec(record)?)?;
        }
        if self.has_bitset() {
            std::fs::write(bitset_dir.join("meta.json"), serde_json::to_vec(&self.meta())?)?;
            std::fs::write(bitset_dir.join("ids.json"), serde_json::to_vec(&self.ids)?)?;
            for (bucket, record) in &self.buckets {
                let path = bitset_dir.join(format!("bucket-{bucket}.json"));
                std::fs::write(path, serde_json::to_vec(record)?)?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// IndexProvider impl
// ============================================================================

#[async_trait]
impl IndexProvider for MemoryIndexProvider {
    async fn load_reverse_shard(&self, key: ShardKey) -> Result<Option<ReverseShardRecord>> {
        self.record_load(format!("reverse/{}", key.file_stem())).await;
        if self.failing_shards.contains(&key) {
            return Err(Error::Index(format!("shard {key} unreadable")));
        }
        Ok(self.reverse.get(&key).cloned())
    }

    async fn load_bitset_meta(&self) -> Result<Option<BitsetMeta>> {
        self.record_load("bitset/meta".into()).await;
        Ok(self.has_bitset().then(|| self.meta()))
    }

    async fn load_bitset_ids(&self) -> Result<Option<IdTableRecord>> {
        self.record_load("bitset/ids".into()).await;
        Ok(self.has_bitset().then(|| self.ids.clone()))
    }

    async fn load_bitset_bucket(&self, bucket: u32) -> Result<Option<BitsetBucketRecord>> {
        self.record_load(format!("bitset/bucket-{bucket}")).await;
        Ok(self.buckets.get(&bucket).cloned())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FsIndexProvider;

    #[tokio::test]
    async fn test_reverse_entries_land_in_their_shard() {
        let mut p = MemoryIndexProvider::new();
        p.insert_reverse("Requests", ["httpie"]);
        let shard = p.load_reverse_shard(ShardKey::Letter(b'r' - b'a')).await.unwrap().unwrap();
        assert_eq!(shard["requests"], vec!["httpie"]);
        assert_eq!(p.load_count("reverse/r"), 1);
    }

    #[tokio::test]
    async fn test_bitset_ids_and_buckets() {
        let mut p = MemoryIndexProvider::new().with_bucket_size(2);
        p.insert_bitset("a", ["x", "y"]);
        p.insert_bitset("b", ["y"]);

        let ids = p.load_bitset_ids().await.unwrap().unwrap();
        assert_eq!(ids.len(), 4);
        let meta = p.load_bitset_meta().await.unwrap().unwrap();
        assert_eq!(meta.total_entries, 4);
        assert_eq!(meta.bucket_size, 2);

        let b_id = ids["b"];
        let bucket = p.load_bitset_bucket(meta.bucket_of(b_id)).await.unwrap().unwrap();
        let entry = bucket.iter().find(|e| e.id == b_id).unwrap();
        assert_eq!(entry.dependents, vec![ids["y"]]);
    }

    #[tokio::test]
    async fn test_no_bitset_means_no_meta() {
        let p = MemoryIndexProvider::new();
        assert!(p.load_bitset_meta().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_to_dir_roundtrips_through_fs_provider() {
        let mut p = MemoryIndexProvider::new().with_bucket_size(3);
        p.insert_both("flask", ["quart", "flask-login"]);
        p.insert_reverse("9lives", ["x"]);

        let dir = tempfile::tempdir().unwrap();
        p.write_to_dir(dir.path()).unwrap();

        let fs = FsIndexProvider::new(dir.path());
        assert_eq!(
            fs.load_reverse_shard(ShardKey::Letter(b'f' - b'a')).await.unwrap(),
            p.load_reverse_shard(ShardKey::Letter(b'f' - b'a')).await.unwrap(),
        );
        assert!(fs.load_reverse_shard(ShardKey::Digit).await.unwrap().is_some());
        assert_eq!(fs.load_bitset_meta().await.unwrap(), p.load_bitset_meta().await.unwrap());
        assert_eq!(fs.load_bitset_ids().await.unwrap(), p.load_bitset_ids().await.unwrap());
    }
}
