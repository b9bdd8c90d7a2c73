//! Per-query breadth/latency knobs.

use serde::{Deserialize, Serialize};

/// Options accepted by `compute_similar` and `compute_cooccurrence`.
///
/// Larger values widen the search and grow the stage budgets, up to the
/// caps in `EngineConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryOptions {
    /// Limit candidates to the query's peer group when it has one.
    pub restrict_to_peer_group: bool,
    /// How many members of the base set to sample (M).
    pub max_dependents_to_scan: usize,
    /// How many candidates may fall through to a live reverse fetch.
    pub max_live_candidates: usize,
    /// How many curated catalog entries seed candidate generation.
    pub top_search_limit: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            restrict_to_peer_group: false,
            max_dependents_to_scan: 50,
            max_live_candidates: 20,
            top_search_limit: 200,
        }
    }
}
