//! Ranking primitives: set overlap metrics and the bounded top-K selector.
//!
//! Everything here is synchronous and allocation-light; the engine calls it
//! between fetches and never suspends inside.

pub mod jaccard;
pub mod topk;

pub use jaccard::{
    Overlap, overlap, jaccard, sorted_overlap, forward_overlap,
    size_upper_bound, passes_size_bound,
};
pub use topk::BoundedTopKSelector;
