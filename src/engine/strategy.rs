//! Ordered fallback strategies.
//!
//! A query runs its plan front to back and stops at the first strategy that
//! produces anything. Strategies share a `ScanState`, which is how the
//! relaxed rescan reuses what the primary pass already resolved.

use crate::config::EngineConfig;
use crate::model::StrategyKind;
use super::QueryContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Strategy {
    /// Candidate generation, prioritized scoring, adaptive thresholds.
    Primary,
    /// Re-score already-resolved candidates with the relaxed threshold.
    RelaxedRescan,
    /// Asymmetric overlap of forward dependencies.
    ForwardOverlap,
    /// Shared name tokens, fixed placeholder score.
    NameToken,
}

impl Strategy {
    pub fn kind(self) -> StrategyKind {
        match self {
            Strategy::Primary => StrategyKind::Primary,
            Strategy::RelaxedRescan => StrategyKind::RelaxedRescan,
            Strategy::ForwardOverlap => StrategyKind::ForwardOverlap,
            Strategy::NameToken => StrategyKind::NameToken,
        }
    }

    /// Plan for `compute_similar`.
    pub fn plan_similar(ctx: &QueryContext, config: &EngineConfig) -> Vec<Strategy> {
        if ctx.base.is_empty() {
            return vec![Strategy::ForwardOverlap, Strategy::NameToken];
        }
        let mut plan = vec![Strategy::Primary, Strategy::RelaxedRescan];
        if ctx.base.len() <= config.small_base_cutoff {
            plan.push(Strategy::NameToken);
        }
        plan
    }
}
