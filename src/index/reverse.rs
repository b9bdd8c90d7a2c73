//! Shard-partitioned reverse-dependency index.
//!
//! Each of the 28 shards sits in its own `OnceCell`. The first caller to
//! touch a shard runs the load; concurrent callers for the same shard wait
//! on that one load instead of starting their own. A failed load leaves the
//! cell empty so a later query can try again.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use tokio::sync::OnceCell;

use super::provider::{IndexProvider, ReverseShardRecord};
use super::ShardKey;
use crate::model::PackageName;
use crate::Result;

/// Distinct normalized dependents of one package.
pub type DependentSet = HashSet<PackageName>;

// ============================================================================
// ReverseShard
// ============================================================================

/// One loaded shard. Immutable once built.
#[derive(Debug, Default)]
pub struct ReverseShard {
    entries: HashMap<PackageName, Arc<DependentSet>>,
}

impl ReverseShard {
    /// Normalize a raw record. Keys that normalize to the same name are
    /// merged; self-dependencies and keys belonging to another shard are
    /// dropped.
    fn from_record(key: ShardKey, record: ReverseShardRecord) -> Self {
        let mut merged: HashMap<PackageName, DependentSet> = HashMap::with_capacity(record.len());
        let mut misplaced = 0usize;
        for (raw_name, raw_dependents) in record {
            let Some(name) = PackageName::normalized(&raw_name) else { continue };
            if ShardKey::of(&name) != key {
                misplaced += 1;
                continue;
            }
            let set = merged.entry(name.clone()).or_default();
            set.extend(
                raw_dependents
                    .iter()
                    .filter_map(|d| PackageName::normalized(d))
                    .filter(|d| *d != name),
            );
        }
        if misplaced > 0 {
            tracing::warn!(shard = %key, misplaced, "dropped entries filed under the wrong shard");
        }
        Self {
            entries: merged.into_iter().map(|(k, v)| (k, Arc::new(v))).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<DependentSet>> {
        self.entries.get(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &PackageName> {
        self.entries.keys()
    }
}

// ============================================================================
// ReverseDependencyIndex
// ============================================================================

pub struct ReverseDependencyIndex {
    provider: Arc<dyn IndexProvider>,
    shards: [OnceCell<Arc<ReverseShard>>; ShardKey::COUNT],
}

impl ReverseDependencyIndex {
    pub fn new(provider: Arc<dyn IndexProvider>) -> Self {
        Self {
            provider,
            shards: std::array::from_fn(|_| OnceCell::new()),
        }
    }

    /// Load (once) and return a shard. A missing record is an empty shard.
    pub async fn shard(&self, key: ShardKey) -> Result<Arc<ReverseShard>> {
        self.shards[key.index()]
            .get_or_try_init(|| async {
                let record = self.provider.load_reverse_shard(key).await?;
                let shard = record
                    .map(|r| ReverseShard::from_record(key, r))
                    .unwrap_or_default();
                tracing::debug!(shard = %key, entries = shard.len(), "loaded reverse shard");
                Ok::<_, crate::Error>(Arc::new(shard))
            })
            .await
            .cloned()
    }

    /// Dependents of `name`, or `None` when the index has no entry or its
    /// shard could not be loaded.
    pub async fn lookup(&self, name: &PackageName) -> Option<Arc<DependentSet>> {
        let key = ShardKey::of(name);
        match self.shard(key).await {
            Ok(shard) => shard.get(name.as_str()).cloned(),
            Err(e) => {
                tracing::warn!(shard = %key, error = %e, "reverse shard unavailable");
                None
            }
        }
    }

    /// Every indexed name across all shards, sorted. Loads every shard;
    /// unreadable shards are skipped.
    pub async fn all_names(&self) -> Vec<PackageName> {
        let mut names = Vec::new();
        for key in ShardKey::all() {
            match self.shard(key).await {
                Ok(shard) => names.extend(shard.names().cloned()),
                Err(e) => tracing::warn!(shard = %key, error = %e, "skipping shard in full scan"),
            }
        }
        names.sort();
        names
    }

    /// Load every shard up front. Fails on the first unreadable shard.
    pub async fn preload(&self) -> Result<()> {
        for key in ShardKey::all() {
            self.shard(key).await?;
        }
        Ok(())
    }

    pub fn loaded_shards(&self) -> usize {
        self.shards.iter().filter(|cell| cell.initialized()).count()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndexProvider;
    use std::time::Duration;

    fn name(s: &str) -> PackageName {
        PackageName::parse(s).unwrap()
    }

    fn provider() -> MemoryIndexProvider {
        let mut p = MemoryIndexProvider::new();
        p.insert_reverse("requests", ["httpie", "twine", "requests"]);
        p.insert_reverse("Requests_Mock", ["pytest-httpx"]);
        p.insert_reverse("numpy", ["pandas", "scipy"]);
        p.insert_reverse("3to2", ["legacy"]);
        p
    }

    #[tokio::test]
    async fn test_lookup_touches_only_its_shard() {
        let p = Arc::new(provider());
        let index = ReverseDependencyIndex::new(p.clone());

        let deps = index.lookup(&name("requests")).await.unwrap();
        assert_eq!(deps.len(), 2, "self-dependency dropped");
        assert_eq!(index.loaded_shards(), 1);
        assert_eq!(p.load_count("reverse/r"), 1);
        assert_eq!(p.load_count("reverse/n"), 0);
    }

    #[tokio::test]
    async fn test_lookup_normalizes_record_keys() {
        let index = ReverseDependencyIndex::new(Arc::new(provider()));
        let deps = index.lookup(&name("requests.mock")).await.unwrap();
        assert!(deps.contains("pytest-httpx"));
    }

    #[tokio::test]
    async fn test_missing_name_and_missing_shard() {
        let index = ReverseDependencyIndex::new(Arc::new(provider()));
        assert!(index.lookup(&name("zzz")).await.is_none());
        assert!(index.lookup(&name("nothing-here")).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_loads_deduplicate() {
        let p = Arc::new(provider().with_load_delay(Duration::from_millis(20)));
        let index = Arc::new(ReverseDependencyIndex::new(p.clone()));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let index = Arc::clone(&index);
            tasks.spawn(async move { index.lookup(&name("numpy")).await.map(|s| s.len()) });
        }
        while let Some(result) = tasks.join_next().await {
            assert_eq!(result.unwrap(), Some(2));
        }
        assert_eq!(p.load_count("reverse/n"), 1);
    }

    #[tokio::test]
    async fn test_failed_shard_degrades_and_retries() {
        let mut raw = provider();
        raw.fail_shard(ShardKey::Letter(b'n' - b'a'));
        let p = Arc::new(raw);
        let index = ReverseDependencyIndex::new(p.clone());

        assert!(index.lookup(&name("numpy")).await.is_none());
        assert!(index.lookup(&name("numpy")).await.is_none());
        assert_eq!(p.load_count("reverse/n"), 2, "failed loads are not cached");
        assert!(index.preload().await.is_err());
    }

    #[tokio::test]
    async fn test_full_scan_merges_shards() {
        let index = ReverseDependencyIndex::new(Arc::new(provider()));
        let names: Vec<String> = index.all_names().await.iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["3to2", "numpy", "requests", "requests-mock"]);
        assert_eq!(index.loaded_shards(), ShardKey::COUNT);
    }
}
