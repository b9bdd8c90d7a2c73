//! # Package Graph Model
//!
//! Plain DTOs shared by every layer: names, scores, ranked results, query
//! options and the curated catalog.
//!
//! Design rule: no I/O, no async, no locks. Index and source types live in
//! their own modules and only ever hand these types across the boundary.

pub mod name;
pub mod score;
pub mod options;
pub mod catalog;

pub use name::PackageName;
pub use score::{SimilarityScore, ScoreSource, RankedResult, StrategyKind};
pub use options::QueryOptions;
pub use catalog::{Catalog, PeerGroup};
