//! Fallbacks for queries with little or no reverse-dependency data.
//!
//! | Strategy | Needs | Score |
//! |----------|-------|-------|
//! | forward overlap | the query's own dependencies | `|D(q) ∩ D(c)| / |D(q)|` |
//! | name token | nothing | fixed placeholder |

use std::cmp::Reverse;

use hashbrown::HashSet;

use super::budget::{self, FetchKind, Stage};
use super::{QueryContext, SimilarityEngine};
use crate::index::DependentSet;
use crate::model::{PackageName, ScoreSource, SimilarityScore};
use crate::rank::{forward_overlap, BoundedTopKSelector};
use crate::source::PackageDataSource;

impl<S: PackageDataSource> SimilarityEngine<S> {
    /// Rank a bounded sample of packages by how much of the query's own
    /// dependency list they also depend on.
    ///
    /// The sample is the curated catalog first, then siblings: indexed
    /// dependents of the query's dependencies.
    pub(super) async fn forward_overlap_scores(&self, ctx: &QueryContext, own: &DependentSet) -> Vec<SimilarityScore> {
        if own.is_empty() {
            return Vec::new();
        }
        let sample = self.forward_sample(ctx, own).await;
        let stage = Stage::start("forward-sample", self.config.stage_budget.for_breadth(sample.len()));
        let batch = budget::fetch_all(&self.source, &self.fetch_limiter, stage, FetchKind::Forward, sample).await;

        let mut selector = BoundedTopKSelector::new(ctx.limit);
        for (name, deps) in batch.ok {
            let theirs: DependentSet = deps.into_iter().filter(|d| *d != name).collect();
            let (ratio, shared) = forward_overlap(own, &theirs);
            if shared > 0 && shared >= self.config.forward_min_shared {
                selector.push(SimilarityScore::new(name, ratio, shared, ScoreSource::ForwardOverlap));
            }
        }
        tracing::debug!(
            query = %ctx.query,
            own = own.len(),
            sampled = batch.attempted,
            failed = batch.failed,
            accepted = selector.len(),
            "forward overlap",
        );
        selector.into_sorted_vec()
    }

    async fn forward_sample(&self, ctx: &QueryContext, own: &DependentSet) -> Vec<PackageName> {
        let mut sample = Sample::new(ctx, self.config.forward_sample_size);
        let curated = ctx
            .peers
            .iter()
            .flatten()
            .chain(self.catalog.top(ctx.options.top_search_limit));
        for name in curated {
            if !sample.offer(name) {
                return sample.names;
            }
        }

        let mut deps: Vec<&PackageName> = own.iter().collect();
        deps.sort();
        for dep in deps {
            let Some(siblings) = self.index.reverse().lookup(dep).await else { continue };
            let mut siblings: Vec<&PackageName> = siblings.iter().collect();
            siblings.sort();
            for sibling in siblings {
                if !sample.offer(sibling) {
                    return sample.names;
                }
            }
        }
        sample.names
    }

    /// Packages sharing a name token with the query, drawn from the curated
    /// catalog and the reverse index's full name list. More shared tokens
    /// rank higher, curated entries break ties.
    ///
    /// Every indexed name is scanned; only the ranked matches are capped.
    pub(super) async fn name_token_matches(&self, ctx: &QueryContext) -> Vec<SimilarityScore> {
        let tokens: HashSet<&str> = ctx.query.tokens().into_iter().collect();
        if tokens.is_empty() {
            return Vec::new();
        }

        let curated: Vec<PackageName> = ctx
            .peers
            .iter()
            .flatten()
            .chain(self.catalog.popular.iter())
            .cloned()
            .collect();
        let indexed = self.index.reverse().all_names().await;

        let mut seen = HashSet::new();
        let mut matches: Vec<(usize, bool, PackageName)> = Vec::new();
        let pool = curated
            .into_iter()
            .map(|n| (n, true))
            .chain(indexed.into_iter().map(|n| (n, false)));
        for (name, is_curated) in pool {
            if !ctx.admits(&name) || !seen.insert(name.clone()) {
                continue;
            }
            let shared = name
                .tokens()
                .iter()
                .collect::<HashSet<_>>()
                .into_iter()
                .filter(|t| tokens.contains(**t))
                .count();
            if shared > 0 {
                matches.push((shared, is_curated, name));
            }
        }

        matches.sort_by(|a, b| {
            (Reverse(a.0), Reverse(a.1), &a.2).cmp(&(Reverse(b.0), Reverse(b.1), &b.2))
        });
        tracing::debug!(query = %ctx.query, matches = matches.len(), "name-token fallback");
        matches
            .into_iter()
            .take(ctx.limit)
            .map(|(_, _, name)| SimilarityScore::new(name, self.config.name_token_score, 0, ScoreSource::NameToken))
            .collect()
    }
}

struct Sample<'a> {
    ctx: &'a QueryContext,
    cap: usize,
    seen: HashSet<PackageName>,
    names: Vec<PackageName>,
}

impl<'a> Sample<'a> {
    fn new(ctx: &'a QueryContext, cap: usize) -> Self {
        Self { ctx, cap, seen: HashSet::new(), names: Vec::new() }
    }

    /// Returns false once the sample is full.
    fn offer(&mut self, name: &PackageName) -> bool {
        if self.names.len() < self.cap && self.ctx.admits(name) && self.seen.insert(name.clone()) {
            self.names.push(name.clone());
        }
        self.names.len() < self.cap
    }
}
