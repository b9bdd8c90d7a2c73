//! # depsim: Related-Package Discovery over a Dependency Graph
//!
//! Ranks packages related to a queried package by analyzing the bipartite
//! graph of packages and their dependents. Two distinct rankings are produced:
//!
//! - **Similarity** (`compute_similar`): Jaccard overlap of reverse-dependent
//!   sets. "Who else is used by the same people?"
//! - **Co-occurrence** (`compute_cooccurrence`): how often a package shows up
//!   among the dependencies of the query's own dependents.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `PackageDataSource` and `IndexProvider` are the contracts
//!    between the engine and the outside world
//! 2. **Injected state**: one `IndexStore` per process, handed to the engine
//! 3. **Bounded everything**: candidate ceilings, evaluation ceilings, stage budgets
//! 4. **Best-effort**: only malformed input is an error; everything else degrades
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use depsim::{
//!     Catalog, EngineConfig, FsIndexProvider, IndexStore, MemorySource,
//!     QueryOptions, SimilarityEngine,
//! };
//!
//! # async fn example() -> depsim::Result<()> {
//! let provider = FsIndexProvider::new("/var/lib/depsim/index");
//! let index = IndexStore::new(Arc::new(provider));
//! let source = MemorySource::new();
//!
//! let engine = SimilarityEngine::new(
//!     source,
//!     index,
//!     Catalog::default(),
//!     EngineConfig::default(),
//! )?;
//!
//! let similar = engine.compute_similar("requests", 10, QueryOptions::default()).await?;
//! for score in &similar.scores {
//!     println!("{} {:.3} ({} shared)", score.name, score.jaccard, score.shared_count);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Lookup Order
//!
//! | Stage | Preferred | Fallback | Last resort |
//! |-------|-----------|----------|-------------|
//! | Base set | `ReverseDependencyIndex` | live fetch | none |
//! | Candidate set | `ReverseDependencyIndex` | `BitsetIndex` | bounded live fetch |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod config;
pub mod limiter;
pub mod source;
pub mod index;
pub mod rank;
pub mod engine;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    PackageName, SimilarityScore, ScoreSource, RankedResult, StrategyKind,
    QueryOptions, Catalog, PeerGroup,
};

// ============================================================================
// Re-exports: Configuration
// ============================================================================

pub use config::{EngineConfig, LimiterConfig, ThresholdTier, CooccurrenceTier, StageBudget};

// ============================================================================
// Re-exports: Data sources and limiters
// ============================================================================

pub use source::{PackageDataSource, FetchError, MemorySource, ThrottledSource};
pub use limiter::{RateLimiter, ConcurrencyLimiter, RetryPolicy};

// ============================================================================
// Re-exports: Index
// ============================================================================

pub use index::{
    IndexStore, IndexProvider, FsIndexProvider, MemoryIndexProvider,
    ReverseDependencyIndex, BitsetIndex, ShardKey,
};

// ============================================================================
// Re-exports: Ranking + Engine
// ============================================================================

pub use rank::{BoundedTopKSelector, jaccard, size_upper_bound};
pub use engine::SimilarityEngine;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Data unavailable for '{package}': {reason}")]
    DataUnavailable { package: String, reason: String },

    #[error("Stage '{stage}' exceeded its budget of {budget_ms}ms")]
    Timeout { stage: &'static str, budget_ms: u64 },

    #[error("Transient fetch failure after {attempts} attempts: {message}")]
    TransientFetch { attempts: u32, message: String },

    #[error("Index error: {0}")]
    Index(String),

    #[error("Concurrency limiter closed")]
    LimiterClosed,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for the kinds the pipeline absorbs into a smaller result set.
    pub fn is_degradable(&self) -> bool {
        !matches!(self, Error::InvalidInput(_) | Error::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
