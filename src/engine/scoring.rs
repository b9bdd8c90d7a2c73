//! The primary scoring pass and the relaxed rescan.
//!
//! Index-resolved candidates are scored in priority order without
//! suspending. Candidates the indexes could not resolve are queued (up to
//! `max_live_candidates`) and fetched in one bounded batch at the end, so a
//! slow data source only ever costs one stage budget.

use std::sync::Arc;

use super::budget::{self, FetchKind, Stage};
use super::candidates::Candidate;
use super::{QueryContext, Resolution, ScanState, SimilarityEngine};
use crate::config::ThresholdTier;
use crate::index::DependentSet;
use crate::model::{PackageName, ScoreSource, SimilarityScore};
use crate::rank::{overlap, passes_size_bound, sorted_overlap, BoundedTopKSelector, Overlap};
use crate::source::PackageDataSource;

impl<S: PackageDataSource> SimilarityEngine<S> {
    pub(super) async fn score_candidates(
        &self,
        ctx: &QueryContext,
        planned: Vec<Candidate>,
        state: &mut ScanState,
    ) -> Vec<SimilarityScore> {
        let mut selector = BoundedTopKSelector::new(ctx.limit);
        let evaluations = planned.len().min(self.config.max_evaluations);
        let stage = Stage::start("scoring", self.config.stage_budget.for_breadth(evaluations));
        let mut live = Vec::new();

        for candidate in planned.into_iter().take(evaluations) {
            if stage.expired() {
                tracing::warn!(query = %ctx.query, checked = state.checked, "scoring budget exhausted, keeping partial ranking");
                break;
            }
            match candidate.resolution {
                Some(resolution) => {
                    if self.evaluate(ctx, candidate.name, resolution, state, &mut selector) {
                        return selector.into_sorted_vec();
                    }
                }
                None if live.len() < ctx.options.max_live_candidates => live.push(candidate.name),
                None => {}
            }
        }

        if !live.is_empty() {
            let stage = Stage::start("live-scoring", self.config.stage_budget.for_breadth(live.len()));
            let batch = budget::fetch_all(&self.source, &self.fetch_limiter, stage, FetchKind::Reverse, live).await;
            tracing::debug!(query = %ctx.query, fetched = batch.succeeded(), failed = batch.failed, "live-scored unresolved candidates");
            for (name, dependents) in batch.ok {
                let set: DependentSet = dependents.into_iter().filter(|d| *d != name).collect();
                if set.is_empty() {
                    continue;
                }
                let resolution = Resolution::Exact(Arc::new(set));
                if self.evaluate(ctx, name, resolution, state, &mut selector) {
                    break;
                }
            }
        }

        tracing::debug!(query = %ctx.query, checked = state.checked, accepted = selector.len(), "scoring pass done");
        selector.into_sorted_vec()
    }

    /// Score one resolved candidate and remember it for the rescan. Returns
    /// true when the ranking is confident enough to stop.
    fn evaluate(
        &self,
        ctx: &QueryContext,
        name: PackageName,
        resolution: Resolution,
        state: &mut ScanState,
        selector: &mut BoundedTopKSelector,
    ) -> bool {
        state.checked += 1;
        if let Some(score) = score_resolved(&ctx.base, &name, &resolution, state.base_ids.as_deref(), &ctx.threshold) {
            selector.push(score);
        }
        state.resolved.push((name, resolution));
        self.should_exit_early(ctx, state.checked, selector)
    }

    fn should_exit_early(&self, ctx: &QueryContext, checked: usize, selector: &BoundedTopKSelector) -> bool {
        let enough_checked = checked >= ctx.limit.saturating_mul(self.config.early_exit_multiplier);
        let exit = enough_checked
            && selector
                .kth_best()
                .is_some_and(|kth| kth > self.config.high_confidence_cutoff);
        if exit {
            tracing::debug!(query = %ctx.query, checked, "confident top-k, stopping early");
        }
        exit
    }

    /// Second pass over everything the primary pass resolved, with the
    /// relaxed thresholds. No new fetches.
    pub(super) fn relaxed_rescan(&self, ctx: &QueryContext, state: &ScanState) -> Vec<SimilarityScore> {
        let relaxed = self.config.relaxed_threshold();
        let mut selector = BoundedTopKSelector::new(ctx.limit);
        for (name, resolution) in &state.resolved {
            if let Some(score) = score_resolved(&ctx.base, name, resolution, state.base_ids.as_deref(), &relaxed) {
                selector.push(score);
            }
        }
        tracing::debug!(query = %ctx.query, rescanned = state.resolved.len(), accepted = selector.len(), "relaxed rescan");
        selector.into_sorted_vec()
    }
}

/// Score a candidate against the base set, or `None` if it cannot meet
/// `threshold`.
///
/// Bitset scores use the true |B| for the union and report a shared count
/// of 0, since base members missing from the ID table make the merged count
/// a lower bound. The merged count still gates `min_shared`.
pub(crate) fn score_resolved(
    base: &DependentSet,
    name: &PackageName,
    resolution: &Resolution,
    base_ids: Option<&[u32]>,
    threshold: &ThresholdTier,
) -> Option<SimilarityScore> {
    if !passes_size_bound(resolution.len(), base.len(), threshold.min_jaccard) {
        return None;
    }
    match resolution {
        Resolution::Exact(set) => {
            let o = overlap(base, &**set);
            threshold
                .accepts(o.jaccard(), o.shared)
                .then(|| SimilarityScore::new(name.clone(), o.jaccard(), o.shared, ScoreSource::Exact))
        }
        Resolution::Ids(ids) => {
            let merged = sorted_overlap(base_ids?, ids);
            let o = Overlap::from_sizes(merged.shared as usize, ids.len(), base.len());
            threshold
                .accepts(o.jaccard(), o.shared)
                .then(|| SimilarityScore::new(name.clone(), o.jaccard(), 0, ScoreSource::Bitset))
        }
    }
}
