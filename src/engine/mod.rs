//! # Similarity Engine
//!
//! Orchestrates the indexes, the data source and the ranking primitives
//! into the two public queries.
//!
//! ```text
//! compute_similar(q)
//!   → base set B         (reverse index, else live reverse fetch)
//!   → strategies, in order, until one yields results:
//!       |B| > 0:  Primary → RelaxedRescan → NameToken (small |B| only)
//!       |B| = 0:  ForwardOverlap → NameToken
//!   → drained top-K, q excluded
//!
//! compute_cooccurrence(q)
//!   → sample M dependents → fetch their dependencies → tally → filter
//!   → |B| = 0: direct dependencies + ForwardOverlap
//! ```
//!
//! Only `Error::InvalidInput` ever escapes. Fetch failures, stage timeouts
//! and unreadable shards shrink the result instead.

mod budget;
mod candidates;
mod scoring;
mod fallback;
mod cooccurrence;
mod strategy;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use hashbrown::HashSet;

use crate::config::{EngineConfig, ThresholdTier};
use crate::index::{DependentSet, IndexStore};
use crate::limiter::ConcurrencyLimiter;
use crate::model::{Catalog, PackageName, QueryOptions, RankedResult, SimilarityScore, StrategyKind};
use crate::source::PackageDataSource;
use crate::Result;

use budget::{FetchKind, Stage};
use strategy::Strategy;

// ============================================================================
// Per-query state
// ============================================================================

/// Everything a strategy needs to know about the query being answered.
pub(crate) struct QueryContext {
    pub query: PackageName,
    pub base: Arc<DependentSet>,
    pub limit: usize,
    pub options: QueryOptions,
    pub threshold: ThresholdTier,
    /// Members of the query's peer group when the query is restricted to it.
    pub peers: Option<Vec<PackageName>>,
    peer_set: Option<HashSet<PackageName>>,
}

impl QueryContext {
    /// Whether `name` may appear in this query's results.
    pub fn admits(&self, name: &PackageName) -> bool {
        *name != self.query && self.peer_set.as_ref().is_none_or(|peers| peers.contains(name))
    }
}

/// A candidate's dependents, as far as the indexes could resolve them.
#[derive(Debug, Clone)]
pub(crate) enum Resolution {
    /// Names from the reverse index or a live fetch.
    Exact(Arc<DependentSet>),
    /// Sorted IDs from the bitset index.
    Ids(Arc<[u32]>),
}

impl Resolution {
    pub fn len(&self) -> usize {
        match self {
            Resolution::Exact(set) => set.len(),
            Resolution::Ids(ids) => ids.len(),
        }
    }
}

/// State carried from one strategy to the next within a query.
#[derive(Debug, Default)]
pub(crate) struct ScanState {
    /// Every candidate the primary pass resolved, for the relaxed rescan.
    pub resolved: Vec<(PackageName, Resolution)>,
    /// The base set mapped to bitset IDs. Filled by `prioritize` when a
    /// candidate resolved through the bitset index.
    pub base_ids: Option<Vec<u32>>,
    pub checked: usize,
}

// ============================================================================
// SimilarityEngine
// ============================================================================

/// Ranks packages related to a query. Safe to share across tasks; every
/// query is independent apart from the read-mostly index caches.
pub struct SimilarityEngine<S: PackageDataSource> {
    source: Arc<S>,
    index: Arc<IndexStore>,
    catalog: Arc<Catalog>,
    config: Arc<EngineConfig>,
    fetch_limiter: ConcurrencyLimiter,
}

impl<S: PackageDataSource> SimilarityEngine<S> {
    pub fn new(source: S, index: IndexStore, catalog: Catalog, config: EngineConfig) -> Result<Self> {
        Self::from_shared(Arc::new(source), Arc::new(index), Arc::new(catalog), config)
    }

    /// Build from handles that are also used elsewhere.
    pub fn from_shared(
        source: Arc<S>,
        index: Arc<IndexStore>,
        catalog: Arc<Catalog>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        let fetch_limiter = ConcurrencyLimiter::new(config.limiter.max_concurrency);
        Ok(Self {
            source,
            index,
            catalog,
            config: Arc::new(config),
            fetch_limiter,
        })
    }

    /// The options configured as `defaultOptions`.
    pub fn default_options(&self) -> QueryOptions {
        self.config.default_options
    }

    /// Packages whose dependents overlap most with the query's dependents.
    ///
    /// `limit` is clamped to the candidate ceiling (`max_candidates`).
    ///
    /// Returns `Error::InvalidInput` for a malformed name and nothing else;
    /// an empty result means there was not enough data.
    pub async fn compute_similar(
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
        tracing::debug!(query = %ctx.query, base = ctx.base.len(), limit, "compute_similar");

        let mut state = ScanState::default();
        for strategy in Strategy::plan_similar(&ctx, &self.config) {
            let scores = self.run_strategy(strategy, &ctx, &mut state).await;
            if !scores.is_empty() {
                tracing::debug!(query = %ctx.query, strategy = ?strategy, results = scores.len(), "strategy succeeded");
                return Ok(self.finish(&ctx, strategy.kind(), scores, data_as_of));
            }
            tracing::debug!(query = %ctx.query, strategy = ?strategy, "strategy yielded nothing, falling back");
        }
        Ok(RankedResult { data_as_of, ..RankedResult::empty(ctx.query) })
    }

    async fn run_strategy(
        &self,
        strategy: Strategy,
        ctx: &QueryContext,
        state: &mut ScanState,
    ) -> Vec<SimilarityScore> {
        match strategy {
            Strategy::Primary => {
                let candidates = self.generate_candidates(ctx).await;
                let planned = self.prioritize(ctx, candidates, state).await;
                self.score_candidates(ctx, planned, state).await
            }
            Strategy::RelaxedRescan => self.relaxed_rescan(ctx, state),
            Strategy::ForwardOverlap => {
                let own = self.forward_set(&ctx.query).await;
                self.forward_overlap_scores(ctx, &own).await
            }
            Strategy::NameToken => self.name_token_matches(ctx).await,
        }
    }

    /// Final guard shared by every strategy: query excluded, limit honoured.
    fn finish(
        &self,
        ctx: &QueryContext,
        strategy: StrategyKind,
        mut scores: Vec<SimilarityScore>,
        data_as_of: Option<DateTime<Utc>>,
    ) -> RankedResult {
        scores.retain(|s| s.name != ctx.query);
        scores.truncate(ctx.limit);
        RankedResult {
            query: ctx.query.clone(),
            strategy,
            scores,
            data_as_of,
        }
    }

    async fn context(&self, query: PackageName, limit: usize, options: QueryOptions) -> QueryContext {
        let base = self.resolve_base(&query).await;
        let threshold = self.config.threshold_for(base.len());
        let peers = options
            .restrict_to_peer_group
            .then(|| self.catalog.peer_group_of(&query))
            .flatten()
            .map(|group| group.members.iter().filter(|m| **m != query).cloned().collect::<Vec<_>>());
        let peer_set = peers.as_ref().map(|p| p.iter().cloned().collect());
        QueryContext {
            query,
            base,
            limit: limit.min(self.config.max_candidates),
            options,
            threshold,
            peers,
            peer_set,
        }
    }

    /// The query's dependents: reverse index first, live fetch second,
    /// empty when neither answers.
    async fn resolve_base(&self, query: &PackageName) -> Arc<DependentSet> {
        if let Some(set) = self.index.reverse().lookup(query).await {
            return set;
        }
        let stage = Stage::start("base", self.config.stage_budget.for_breadth(1));
        let fetched = budget::fetch_one(&self.source, &self.fetch_limiter, stage, FetchKind::Reverse, query).await;
        let set: DependentSet = fetched
            .unwrap_or_default()
            .into_iter()
            .filter(|d| d != query)
            .collect();
        tracing::debug!(%query, dependents = set.len(), "base set from live fetch");
        Arc::new(set)
    }

    /// The query's own forward dependencies, empty on failure.
    async fn forward_set(&self, name: &PackageName) -> DependentSet {
        let stage = Stage::start("forward-query", self.config.stage_budget.for_breadth(1));
        budget::fetch_one(&self.source, &self.fetch_limiter, stage, FetchKind::Forward, name)
            .await
            .unwrap_or_default()
            .into_iter()
            .filter(|d| d != name)
            .collect()
    }
}
