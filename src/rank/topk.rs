//! Fixed-capacity top-K selection.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::model::SimilarityScore;

/// Heap entry ordered by `SimilarityScore::rank_cmp`.
#[derive(Debug, Clone)]
struct Ranked(SimilarityScore);

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.rank_cmp(&other.0)
    }
}

/// Keeps the K best scores seen, in O(log K) per push.
///
/// Internally a min-heap: the root is the worst retained score. Once full,
/// an incoming score replaces the root only if it ranks strictly higher, so
/// the final contents do not depend on arrival order.
#[derive(Debug, Clone)]
pub struct BoundedTopKSelector {
    capacity: usize,
    heap: BinaryHeap<Reverse<Ranked>>,
}

impl BoundedTopKSelector {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            heap: BinaryHeap::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    /// Offer a score. Returns true if it was retained.
    pub fn push(&mut self, score: SimilarityScore) -> bool {
        if self.capacity == 0 {
            return false;
        }
        let incoming = Ranked(score);
        if self.heap.len() < self.capacity {
            self.heap.push(Reverse(incoming));
            return true;
        }
        match self.heap.peek_mut() {
            Some(mut root) if incoming > root.0 => {
                // PeekMut re-sifts on drop.
                *root = Reverse(incoming);
                true
            }
            _ => false,
        }
    }

    /// Worst retained score (the heap root).
    pub fn min(&self) -> Option<&SimilarityScore> {
        self.heap.peek().map(|r| &r.0 .0)
    }

    /// Jaccard of the K-th best score, once K scores are held.
    pub fn kth_best(&self) -> Option<f64> {
        if self.is_full() { self.min().map(|s| s.jaccard) } else { None }
    }

    /// Drain into a best-first vector.
    pub fn into_sorted_vec(self) -> Vec<SimilarityScore> {
        // Ascending over Reverse = descending over Ranked.
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(Ranked(score))| score)
            .collect()
    }
}
