//! # Engine Configuration
//!
//! Every tunable the ranking pipeline reads lives here, in one value object
//! handed to `SimilarityEngine::new`. Nothing in the engine reads the
//! environment.
//!
//! | Knob | Default | Meaning |
//! |------|---------|---------|
//! | `max_candidates` | 2000 | Candidate collection ceiling (C) |
//! | `max_evaluations` | 500 | Scoring ceiling (E) |
//! | `early_exit_multiplier` | 5 | Checked ≥ `limit × this` before early exit |
//! | `high_confidence_cutoff` | 0.5 | K-th best must exceed this to exit early |
//! | `small_base_cutoff` | 10 | Name-token fallback only for bases this small |
//! | `name_token_score` | 0.05 | Placeholder score for name-token matches |
//! | `forward_sample_size` | 100 | Catalog packages probed by forward overlap |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::QueryOptions;
use crate::{Error, Result};

// ============================================================================
// Adaptive thresholds
// ============================================================================

/// Acceptance thresholds for bases up to `max_base_size` dependents.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdTier {
    pub max_base_size: usize,
    pub min_jaccard: f64,
    pub min_shared: u32,
}

impl ThresholdTier {
    pub const fn new(max_base_size: usize, min_jaccard: f64, min_shared: u32) -> Self {
        Self { max_base_size, min_jaccard, min_shared }
    }

    pub fn accepts(&self, jaccard: f64, shared: u32) -> bool {
        jaccard >= self.min_jaccard && shared >= self.min_shared
    }
}

/// Co-occurrence filter used once the sampling success rate reaches
/// `min_success_rate`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooccurrenceTier {
    pub min_success_rate: f64,
    pub min_shared: u32,
    pub min_jaccard: f64,
}

// ============================================================================
// Stage budgets
// ============================================================================

/// Wall-clock budget for one pipeline stage: `base + per_item × breadth`,
/// capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StageBudget {
    pub base_ms: u64,
    pub per_item_ms: u64,
    pub max_ms: u64,
}

impl Default for StageBudget {
    fn default() -> Self {
        Self { base_ms: 250, per_item_ms: 20, max_ms: 5_000 }
    }
}

impl StageBudget {
    pub fn for_breadth(&self, breadth: usize) -> Duration {
        let ms = self
            .base_ms
            .saturating_add(self.per_item_ms.saturating_mul(breadth as u64))
            .min(self.max_ms);
        Duration::from_millis(ms)
    }
}

// ============================================================================
// Limiter configuration
// ============================================================================

/// Settings for the fetch substrate wrapped around a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LimiterConfig {
    /// In-flight fetch tasks per engine (N).
    pub max_concurrency: usize,
    /// Minimum spacing between dispatches to one domain (D).
    pub min_interval_ms: u64,
    pub retry_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            min_interval_ms: 50,
            retry_attempts: 3,
            backoff_base_ms: 100,
            backoff_max_ms: 2_000,
        }
    }
}

// ============================================================================
// EngineConfig
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub max_candidates: usize,
    pub max_evaluations: usize,
    pub early_exit_multiplier: usize,
    pub high_confidence_cutoff: f64,
    /// Sorted by `max_base_size`; bases larger than every tier use the last.
    pub thresholds: Vec<ThresholdTier>,
    pub relaxed_min_jaccard: f64,
    pub relaxed_min_shared: u32,
    pub small_base_cutoff: usize,
    pub name_token_score: f64,
    pub forward_sample_size: usize,
    pub forward_min_shared: u32,
    /// Sorted by `min_success_rate`, highest first.
    pub cooccurrence_tiers: Vec<CooccurrenceTier>,
    pub stage_budget: StageBudget,
    pub default_options: QueryOptions,
    pub limiter: LimiterConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_candidates: 2_000,
            max_evaluations: 500,
            early_exit_multiplier: 5,
            high_confidence_cutoff: 0.5,
            thresholds: vec![
                ThresholdTier::new(5, 0.01, 1),
                ThresholdTier::new(20, 0.02, 2),
                ThresholdTier::new(100, 0.03, 3),
                ThresholdTier::new(1_000, 0.05, 5),
                ThresholdTier::new(usize::MAX, 0.05, 10),
            ],
            relaxed_min_jaccard: 0.001,
            relaxed_min_shared: 1,
            small_base_cutoff: 10,
            name_token_score: 0.05,
            forward_sample_size: 100,
            forward_min_shared: 1,
            cooccurrence_tiers: vec![
                CooccurrenceTier { min_success_rate: 0.75, min_shared: 3, min_jaccard: 0.05 },
                CooccurrenceTier { min_success_rate: 0.4, min_shared: 2, min_jaccard: 0.02 },
                CooccurrenceTier { min_success_rate: 0.0, min_shared: 1, min_jaccard: 0.01 },
            ],
            stage_budget: StageBudget::default(),
            default_options: QueryOptions::default(),
            limiter: LimiterConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.thresholds.is_empty() {
            return Err(Error::Config("thresholds must not be empty".into()));
        }
        if self.thresholds.windows(2).any(|w| w[0].max_base_size >= w[1].max_base_size) {
            return Err(Error::Config("thresholds must be sorted by maxBaseSize".into()));
        }
        if self.cooccurrence_tiers.is_empty() {
            return Err(Error::Config("cooccurrenceTiers must not be empty".into()));
        }
        let unit = |x: f64| (0.0..=1.0).contains(&x);
        let all_unit = self.thresholds.iter().all(|t| unit(t.min_jaccard))
            && self.cooccurrence_tiers.iter().all(|t| unit(t.min_jaccard) && unit(t.min_success_rate))
            && unit(self.high_confidence_cutoff)
            && unit(self.relaxed_min_jaccard)
            && unit(self.name_token_score);
        if !all_unit {
            return Err(Error::Config("ratios and thresholds must lie in [0, 1]".into()));
        }
        if self.max_candidates == 0 || self.max_evaluations == 0 {
            return Err(Error::Config("candidate and evaluation ceilings must be positive".into()));
        }
        if self.early_exit_multiplier == 0 {
            return Err(Error::Config("earlyExitMultiplier must be at least 1".into()));
        }
        if self.limiter.max_concurrency == 0 {
            return Err(Error::Config("limiter.maxConcurrency must be positive".into()));
        }
        Ok(())
    }

    /// Thresholds for a base set of `base_size` dependents.
    pub fn threshold_for(&self, base_size: usize) -> ThresholdTier {
        self.thresholds
            .iter()
            .find(|t| base_size <= t.max_base_size)
            .or_else(|| self.thresholds.last())
            .copied()
            .unwrap_or(ThresholdTier::new(usize::MAX, 0.0, 0))
    }

    /// Co-occurrence filter for a sampling success rate in `[0, 1]`.
    pub fn cooccurrence_tier_for(&self, success_rate: f64) -> CooccurrenceTier {
        self.cooccurrence_tiers
            .iter()
            .find(|t| success_rate >= t.min_success_rate)
            .or_else(|| self.cooccurrence_tiers.last())
            .copied()
            .unwrap_or(CooccurrenceTier { min_success_rate: 0.0, min_shared: 1, min_jaccard: 0.0 })
    }

    pub fn relaxed_threshold(&self) -> ThresholdTier {
        ThresholdTier::new(usize::MAX, self.relaxed_min_jaccard, self.relaxed_min_shared)
    }
}
