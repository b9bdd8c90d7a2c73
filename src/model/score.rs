//! Scores and ranked results.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::PackageName;

/// Where a score came from. Only `Exact` satisfies
/// `jaccard == shared_count / union` exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// Exact set intersection of two reverse-dependent sets.
    Exact,
    /// Sorted-ID merge over the bitset index. Approximate; `shared_count` is 0.
    Bitset,
    /// Asymmetric forward-dependency overlap `|D(q) ∩ D(c)| / |D(q)|`.
    ForwardOverlap,
    /// Name-token heuristic with a fixed placeholder score.
    NameToken,
    /// Frequency among the dependencies of sampled dependents.
    Cooccurrence,
    /// A direct dependency of the query, pinned to the top of co-occurrence.
    DirectDependency,
}

/// Which strategy produced a ranked result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Primary,
    ForwardOverlap,
    RelaxedRescan,
    NameToken,
    Cooccurrence,
    /// No strategy yielded anything.
    Exhausted,
}

/// A single candidate's score against the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityScore {
    pub name: PackageName,
    /// In `[0, 1]`. For non-`Exact` sources this field carries the source's
    /// own metric; check `source` before comparing across sources.
    pub jaccard: f64,
    pub shared_count: u32,
    pub source: ScoreSource,
}

impl SimilarityScore {
    pub fn new(name: PackageName, jaccard: f64, shared_count: u32, source: ScoreSource) -> Self {
        Self {
            name,
            jaccard: jaccard.clamp(0.0, 1.0),
            shared_count,
            source,
        }
    }

    /// Ranking order: higher jaccard, then higher shared count, then the
    /// lexicographically smaller name. `Greater` means "ranks higher".
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        self.jaccard
            .total_cmp(&other.jaccard)
            .then(self.shared_count.cmp(&other.shared_count))
            .then_with(|| other.name.cmp(&self.name))
    }
}

/// Ordered result of a similarity or co-occurrence query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    pub query: PackageName,
    pub strategy: StrategyKind,
    /// Sorted best-first. Never longer than the requested limit.
    pub scores: Vec<SimilarityScore>,
    /// Generation time of the persisted index, when known.
    pub data_as_of: Option<DateTime<Utc>>,
}

impl RankedResult {
    pub fn empty(query: PackageName) -> Self {
        Self {
            query,
            strategy: StrategyKind::Exhausted,
            scores: Vec::new(),
            data_as_of: None,
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.scores.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&SimilarityScore> {
        self.scores.iter().find(|s| s.name.as_str() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}
