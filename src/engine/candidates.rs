//! Candidate generation and scoring order.
//!
//! Candidates come from two places: the curated catalog (peer group first
//! when the query is restricted to one) and expansion, i.e. the forward
//! dependencies of a sample of the query's dependents. Both stop at the
//! candidate ceiling.

use std::cmp::Ordering;

use hashbrown::HashSet;
use tokio::time::timeout_at;

use super::budget::{self, FetchKind, Stage};
use super::{QueryContext, Resolution, ScanState, SimilarityEngine};
use crate::index::DependentSet;
use crate::model::PackageName;
use crate::source::PackageDataSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Origin {
    Curated,
    Expansion,
}

#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub name: PackageName,
    pub origin: Origin,
    /// Catalog position for curated candidates, arrival order otherwise.
    pub position: usize,
    /// Dependents as resolved from the indexes. `None` means a live fetch
    /// is needed.
    pub resolution: Option<Resolution>,
}

/// Deduplicating, capped candidate list.
struct Collector<'a> {
    ctx: &'a QueryContext,
    cap: usize,
    seen: HashSet<PackageName>,
    out: Vec<Candidate>,
}

impl<'a> Collector<'a> {
    fn new(ctx: &'a QueryContext, cap: usize) -> Self {
        Self { ctx, cap, seen: HashSet::new(), out: Vec::new() }
    }

    fn is_full(&self) -> bool {
        self.out.len() >= self.cap
    }

    /// Returns false once the ceiling is hit.
    fn offer(&mut self, name: &PackageName, origin: Origin) -> bool {
        if self.is_full() {
            return false;
        }
        if self.ctx.admits(name) && self.seen.insert(name.clone()) {
            let position = self.out.len();
            self.out.push(Candidate { name: name.clone(), origin, position, resolution: None });
        }
        true
    }
}

impl<S: PackageDataSource> SimilarityEngine<S> {
    /// Curated subset ∪ expansion, capped at `max_candidates`.
    pub(super) async fn generate_candidates(&self, ctx: &QueryContext) -> Vec<Candidate> {
        let mut collector = Collector::new(ctx, self.config.max_candidates);

        let curated = ctx
            .peers
            .iter()
            .flatten()
            .chain(self.catalog.top(ctx.options.top_search_limit));
        for name in curated {
            if !collector.offer(name, Origin::Curated) {
                break;
            }
        }
        let curated_count = collector.out.len();

        if collector.is_full() {
            tracing::debug!(query = %ctx.query, candidates = curated_count, "candidate ceiling hit before expansion");
            return collector.out;
        }

        let sample = sample_members(&ctx.base, ctx.options.max_dependents_to_scan);
        let stage = Stage::start("expansion", self.config.stage_budget.for_breadth(sample.len()));
        let batch = budget::fetch_all(&self.source, &self.fetch_limiter, stage, FetchKind::Forward, sample).await;
        'expand: for (_, deps) in &batch.ok {
            for dep in deps {
                if !collector.offer(dep, Origin::Expansion) {
                    break 'expand;
                }
            }
        }

        tracing::debug!(
            query = %ctx.query,
            curated = curated_count,
            expanded = collector.out.len() - curated_count,
            sampled = batch.attempted,
            failed = batch.failed,
            "generated candidates",
        );
        collector.out
    }

    /// Resolve candidates from the indexes and put them in scoring order:
    /// curated in catalog order, then by closeness of dependent count to
    /// |B|, then whatever the indexes could not size.
    ///
    /// Index loads run under the `prioritize` stage. Candidates still
    /// unresolved at the deadline are left for the live pass, and the base
    /// set is mapped to bitset IDs here when any candidate needs it.
    pub(super) async fn prioritize(
        &self,
        ctx: &QueryContext,
        mut candidates: Vec<Candidate>,
        state: &mut ScanState,
    ) -> Vec<Candidate> {
        let stage = Stage::start("prioritize", self.config.stage_budget.for_breadth(candidates.len()));
        let bitset_available = timeout_at(stage.deadline, self.index.bitset().is_available())
            .await
            .unwrap_or(false);
        let mut resolved = 0;
        for candidate in &mut candidates {
            let resolution = timeout_at(stage.deadline, self.resolve(&candidate.name, bitset_available)).await;
            match resolution {
                Ok(resolution) => candidate.resolution = resolution,
                Err(_) => {
                    tracing::warn!(query = %ctx.query, resolved, "prioritize budget exhausted, rest goes live");
                    break;
                }
            }
            resolved += 1;
        }

        let needs_ids = candidates.iter().any(|c| matches!(c.resolution, Some(Resolution::Ids(_))));
        if needs_ids && state.base_ids.is_none() {
            match timeout_at(stage.deadline, self.index.bitset().ids_for(ctx.base.iter())).await {
                Ok(ids) => state.base_ids = Some(ids),
                Err(_) => tracing::warn!(query = %ctx.query, "base ID mapping timed out, bitset candidates skipped"),
            }
        }

        let base_len = ctx.base.len();
        candidates.sort_by(|a, b| priority_cmp(a, b, base_len));
        candidates
    }

    async fn resolve(&self, name: &PackageName, bitset_available: bool) -> Option<Resolution> {
        match self.index.reverse().lookup(name).await {
            Some(set) => Some(Resolution::Exact(set)),
            None if bitset_available => self.index.bitset().dependents(name).await.map(Resolution::Ids),
            None => None,
        }
    }
}

fn priority_cmp(a: &Candidate, b: &Candidate, base_len: usize) -> Ordering {
    let rank = |c: &Candidate| match (c.origin, &c.resolution) {
        (Origin::Curated, _) => 0u8,
        (_, Some(_)) => 1,
        (_, None) => 2,
    };
    rank(a).cmp(&rank(b)).then_with(|| match (rank(a), &a.resolution, &b.resolution) {
        (0, _, _) => a.position.cmp(&b.position),
        (1, Some(ra), Some(rb)) => ra
            .len()
            .abs_diff(base_len)
            .cmp(&rb.len().abs_diff(base_len))
            .then_with(|| a.name.cmp(&b.name)),
        _ => a.name.cmp(&b.name),
    })
}

/// Up to `m` members of `set`, chosen by even stride over the sorted
/// members so the same set always yields the same sample.
pub(super) fn sample_members(set: &DependentSet, m: usize) -> Vec<PackageName> {
    let mut all: Vec<&PackageName> = set.iter().collect();
    all.sort();
    if all.len() <= m {
        return all.into_iter().cloned().collect();
    }
    (0..m).map(|i| all[i * all.len() / m].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn name(s: &str) -> PackageName {
        PackageName::parse(s).unwrap()
    }

    fn candidate(n: &str, origin: Origin, position: usize, size: Option<usize>) -> Candidate {
        let resolution = size.map(|len| {
            let set: DependentSet = (0..len).map(|i| name(&format!("dep{i}"))).collect();
            Resolution::Exact(Arc::new(set))
        });
        Candidate { name: name(n), origin, position, resolution }
    }

    #[test]
    fn test_sample_is_deterministic_and_bounded() {
        let set: DependentSet = (0..40).map(|i| name(&format!("pkg{i:02}"))).collect();
        let a = sample_members(&set, 8);
        let b = sample_members(&set, 8);
        assert_eq!(a.len(), 8);
        assert_eq!(a, b);
        assert_eq!(a[0].as_str(), "pkg00");
        assert_eq!(a[1].as_str(), "pkg05");
    }

    #[test]
    fn test_sample_of_small_set_is_whole_set() {
        let set: DependentSet = [name("b"), name("a")].into_iter().collect();
        assert_eq!(sample_members(&set, 10), vec![name("a"), name("b")]);
        assert!(sample_members(&set, 0).is_empty());
    }

    #[test]
    fn test_priority_order() {
        let mut list = vec![
            candidate("unsized", Origin::Expansion, 0, None),
            candidate("far", Origin::Expansion, 1, Some(40)),
            candidate("second-curated", Origin::Curated, 1, None),
            candidate("close", Origin::Expansion, 2, Some(11)),
            candidate("first-curated", Origin::Curated, 0, Some(500)),
        ];
        list.sort_by(|a, b| priority_cmp(a, b, 10));
        let order: Vec<&str> = list.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(order, vec!["first-curated", "second-curated", "close", "far", "unsized"]);
    }
}
