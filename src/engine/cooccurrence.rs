//! Co-occurrence: what else do the query's dependents depend on?
//!
//! A name's score is the fraction of successfully sampled dependents that
//! also list it. The filter tightens as the sampling success rate rises,
//! since a high rate means the counts are trustworthy.

use hashbrown::{HashMap, HashSet};

use super::budget::{self, FetchKind, Stage};
use super::candidates::sample_members;
use super::{QueryContext, SimilarityEngine};
use crate::model::{PackageName, QueryOptions, RankedResult, ScoreSource, SimilarityScore, StrategyKind};
use crate::rank::BoundedTopKSelector;
use crate::source::PackageDataSource;
use crate::Result;

impl<S: PackageDataSource> SimilarityEngine<S> {
    /// Packages most often depended on alongside the query.
    ///
    /// With no known dependents, the query's own direct dependencies come
    /// first (score 1.0), followed by forward-overlap matches. Returns
    /// `Error::InvalidInput` for a malformed name and nothing else.
    /// `limit` is clamped to `max_candidates`, as in `compute_similar`.
    pub async fn compute_cooccurrence(
        &self,
        pkg: &str,
        limit: usize,
        options: QueryOptions,
    ) -> Result<RankedResult> {
        let query = PackageName::parse(pkg)?;
        let data_as_of = self.index.data_as_of().await;
        if limit == 0 {
            return Ok(RankedResult { data_as_of, ..RankedResult::empty(query) });
        }

        let ctx = self.context(query, limit, options).await;
        tracing::debug!(query = %ctx.query, base = ctx.base.len(), limit, "compute_cooccurrence");

        if !ctx.base.is_empty() {
            let scores = self.cooccurrence_scores(&ctx).await;
            if !scores.is_empty() {
                return Ok(self.finish(&ctx, StrategyKind::Cooccurrence, scores, data_as_of));
            }
            tracing::debug!(query = %ctx.query, "no co-occurring packages, falling back to direct dependencies");
        }

        let scores = self.direct_then_forward(&ctx).await;
        if scores.is_empty() {
            return Ok(RankedResult { data_as_of, ..RankedResult::empty(ctx.query) });
        }
        Ok(self.finish(&ctx, StrategyKind::ForwardOverlap, scores, data_as_of))
    }

    async fn cooccurrence_scores(&self, ctx: &QueryContext) -> Vec<SimilarityScore> {
        let sample = sample_members(&ctx.base, ctx.options.max_dependents_to_scan);
        let sampled = sample.len();
        let stage = Stage::start("cooccurrence", self.config.stage_budget.for_breadth(sampled));
        let batch = budget::fetch_all(&self.source, &self.fetch_limiter, stage, FetchKind::Forward, sample).await;
        let successes = batch.succeeded();
        if successes == 0 {
            tracing::warn!(query = %ctx.query, sampled, failed = batch.failed, "no sampled dependent could be fetched");
            return Vec::new();
        }

        // Each dependent counts a name at most once.
        let mut tally: HashMap<PackageName, u32> = HashMap::new();
        for (dependent, deps) in &batch.ok {
            let unique: HashSet<&PackageName> = deps
                .iter()
                .filter(|d| **d != ctx.query && *d != dependent)
                .collect();
            for dep in unique {
                *tally.entry(dep.clone()).or_default() += 1;
            }
        }

        let success_rate = successes as f64 / sampled as f64;
        let tier = self.config.cooccurrence_tier_for(success_rate);
        let min_shared = tier.min_shared.min(successes as u32);

        let mut selector = BoundedTopKSelector::new(ctx.limit);
        for (name, count) in tally {
            if !ctx.admits(&name) {
                continue;
            }
            let frequency = f64::from(count) / successes as f64;
            if count >= min_shared && frequency >= tier.min_jaccard {
                selector.push(SimilarityScore::new(name, frequency, count, ScoreSource::Cooccurrence));
            }
        }
        tracing::debug!(
            query = %ctx.query,
            sampled,
            successes,
            success_rate,
            min_shared,
            accepted = selector.len(),
            "co-occurrence tally",
        );
        selector.into_sorted_vec()
    }

    /// The query's direct dependencies, sorted, then forward-overlap
    /// matches that are not already listed.
    async fn direct_then_forward(&self, ctx: &QueryContext) -> Vec<SimilarityScore> {
        let own = self.forward_set(&ctx.query).await;
        let mut direct: Vec<&PackageName> = own.iter().collect();
        direct.sort();
        let mut scores: Vec<SimilarityScore> = direct
            .into_iter()
            .map(|d| SimilarityScore::new(d.clone(), 1.0, 1, ScoreSource::DirectDependency))
            .collect();
        let related = self.forward_overlap_scores(ctx, &own).await;
        scores.extend(related.into_iter().filter(|s| !own.contains(&s.name)));
        scores
    }
}
