//! Dense-ID bitset index.
//!
//! Every indexed package has a `u32` ID; its dependents are stored as a
//! sorted ID array in bucket `id / bucketSize`. Intersections are a
//! two-pointer merge over two such arrays (see `rank::sorted_overlap`), so
//! very large dependent sets never have to be materialized as names.
//!
//! Names missing from the ID table cannot be mapped, so any overlap computed
//! here is approximate.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use tokio::sync::OnceCell;

use super::provider::{BitsetBucketRecord, BitsetMeta, IdTableRecord, IndexProvider};
use crate::model::PackageName;
use crate::{Error, Result};

/// One loaded bucket: ID → sorted, de-duplicated dependent IDs.
#[derive(Debug, Default)]
pub struct BitsetBucket {
    entries: HashMap<u32, Arc<[u32]>>,
}

impl BitsetBucket {
    fn from_record(record: BitsetBucketRecord) -> Self {
        let mut entries = HashMap::with_capacity(record.len());
        for mut entry in record {
            entry.dependents.retain(|d| *d != entry.id);
            entry.dependents.sort_unstable();
            entry.dependents.dedup();
            entries.insert(entry.id, Arc::from(entry.dependents));
        }
        Self { entries }
    }

    pub fn get(&self, id: u32) -> Option<&Arc<[u32]>> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Layout {
    meta: BitsetMeta,
    buckets: Vec<OnceCell<Arc<BitsetBucket>>>,
}

pub struct BitsetIndex {
    provider: Arc<dyn IndexProvider>,
    /// `Some(None)` once we know the provider has no bitset data.
    layout: OnceCell<Option<Arc<Layout>>>,
    ids: OnceCell<Arc<HashMap<PackageName, u32>>>,
}

impl BitsetIndex {
    pub fn new(provider: Arc<dyn IndexProvider>) -> Self {
        Self {
            provider,
            layout: OnceCell::new(),
            ids: OnceCell::new(),
        }
    }

    async fn layout(&self) -> Option<Arc<Layout>> {
        let loaded = self
            .layout
            .get_or_try_init(|| async {
                let meta = self.provider.load_bitset_meta().await?;
                Ok::<_, Error>(meta.map(|meta| {
                    let count = meta.bucket_count() as usize;
                    tracing::debug!(entries = meta.total_entries, buckets = count, "loaded bitset metadata");
                    Arc::new(Layout {
                        meta,
                        buckets: (0..count).map(|_| OnceCell::new()).collect(),
                    })
                }))
            })
            .await;
        match loaded {
            Ok(layout) => layout.clone(),
            Err(e) => {
                tracing::warn!(error = %e, "bitset metadata unavailable");
                None
            }
        }
    }

    async fn id_table(&self) -> Option<Arc<HashMap<PackageName, u32>>> {
        let loaded = self
            .ids
            .get_or_try_init(|| async {
                let record = self.provider.load_bitset_ids().await?.unwrap_or_default();
                Ok::<_, Error>(Arc::new(Self::normalize_ids(record)))
            })
            .await;
        match loaded {
            Ok(table) => Some(Arc::clone(table)),
            Err(e) => {
                tracing::warn!(error = %e, "bitset id table unavailable");
                None
            }
        }
    }

    fn normalize_ids(record: IdTableRecord) -> HashMap<PackageName, u32> {
        record
            .into_iter()
            .filter_map(|(raw, id)| PackageName::normalized(&raw).map(|name| (name, id)))
            .collect()
    }

    async fn bucket(&self, layout: &Layout, bucket: u32) -> Result<Option<Arc<BitsetBucket>>> {
        let Some(cell) = layout.buckets.get(bucket as usize) else {
            return Ok(None);
        };
        let loaded = cell
            .get_or_try_init(|| async {
                let record = self.provider.load_bitset_bucket(bucket).await?.unwrap_or_default();
                Ok::<_, Error>(Arc::new(BitsetBucket::from_record(record)))
            })
            .await?;
        Ok(Some(Arc::clone(loaded)))
    }

    /// Whether the provider has any bitset data at all.
    pub async fn is_available(&self) -> bool {
        self.layout().await.is_some()
    }

    pub async fn generated_at(&self) -> Option<DateTime<Utc>> {
        self.layout().await.and_then(|l| l.meta.generated_at)
    }

    /// Sorted dependent IDs of `name`, if it is in the bitset index.
    pub async fn dependents(&self, name: &PackageName) -> Option<Arc<[u32]>> {
        let layout = self.layout().await?;
        let id = self.id_table().await?.get(name.as_str()).copied()?;
        match self.bucket(&layout, layout.meta.bucket_of(id)).await {
            Ok(bucket) => bucket?.get(id).cloned(),
            Err(e) => {
                tracing::warn!(%name, error = %e, "bitset bucket unavailable");
                None
            }
        }
    }

    /// Map names to IDs, dropping names the table does not know. Sorted and
    /// de-duplicated, ready for a merge intersection.
    pub async fn ids_for<'a, I>(&self, names: I) -> Vec<u32>
    where
        I: IntoIterator<Item = &'a PackageName>,
    {
        let Some(table) = self.id_table().await else {
            return Vec::new();
        };
        let mut ids: Vec<u32> = names
            .into_iter()
            .filter_map(|n| table.get(n.as_str()).copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndexProvider;
    use crate::rank::sorted_overlap;

    fn name(s: &str) -> PackageName {
        PackageName::parse(s).unwrap()
    }

    fn provider() -> MemoryIndexProvider {
        let mut p = MemoryIndexProvider::new().with_bucket_size(3);
        p.insert_bitset("django", ["wagtail", "celery", "drf", "django"]);
        p.insert_bitset("flask", ["celery", "quart"]);
        p
    }

    #[tokio::test]
    async fn test_dependents_are_sorted_without_self() {
        let index = BitsetIndex::new(Arc::new(provider()));
        let deps = index.dependents(&name("django")).await.unwrap();
        assert_eq!(deps.len(), 3);
        assert!(deps.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn test_overlap_via_ids() {
        let index = BitsetIndex::new(Arc::new(provider()));
        let django = index.dependents(&name("django")).await.unwrap();
        let flask = index.dependents(&name("flask")).await.unwrap();
        let o = sorted_overlap(&django, &flask);
        assert_eq!(o.shared, 1);
        assert_eq!(o.union, 4);
    }

    #[tokio::test]
    async fn test_ids_for_drops_unknown_names() {
        let index = BitsetIndex::new(Arc::new(provider()));
        let names = [name("celery"), name("quart"), name("unknown"), name("celery")];
        let ids = index.ids_for(names.iter()).await;
        assert_eq!(ids.len(), 2);
        assert!(ids[0] < ids[1]);
    }

    #[tokio::test]
    async fn test_absent_bitset_is_unavailable() {
        let p = Arc::new(MemoryIndexProvider::new());
        let index = BitsetIndex::new(p.clone());
        assert!(!index.is_available().await);
        assert!(index.dependents(&name("django")).await.is_none());
        assert_eq!(p.load_count("bitset/meta"), 1, "absence is cached");
    }

    #[tokio::test]
    async fn test_buckets_load_once() {
        let p = Arc::new(provider());
        let index = BitsetIndex::new(p.clone());
        index.dependents(&name("django")).await;
        index.dependents(&name("django")).await;
        let total_bucket_loads: u64 = (0..4).map(|b| p.load_count(&format!("bitset/bucket-{b}"))).sum();
        assert_eq!(total_bucket_loads, 1);
    }
}
