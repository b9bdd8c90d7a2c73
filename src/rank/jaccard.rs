//! Set overlap metrics.

use std::hash::{BuildHasher, Hash};

use hashbrown::HashSet;

/// Intersection and union sizes of two sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Overlap {
    pub shared: u32,
    pub union: u32,
}

impl Overlap {
    pub fn from_sizes(shared: usize, a_len: usize, b_len: usize) -> Self {
        let union = a_len + b_len - shared;
        Self {
            shared: shared as u32,
            union: union as u32,
        }
    }

    /// `shared / union`, or 0 when both sets are empty.
    pub fn jaccard(&self) -> f64 {
        if self.union == 0 {
            0.0
        } else {
            self.shared as f64 / self.union as f64
        }
    }
}

/// Exact overlap. Iterates the smaller set and probes the larger.
pub fn overlap<T, S>(a: &HashSet<T, S>, b: &HashSet<T, S>) -> Overlap
where
    T: Eq + Hash,
    S: BuildHasher,
{
    let (small, large) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let shared = small.iter().filter(|x| large.contains(*x)).count();
    Overlap::from_sizes(shared, a.len(), b.len())
}

/// Exact Jaccard index of two sets.
pub fn jaccard<T, S>(a: &HashSet<T, S>, b: &HashSet<T, S>) -> f64
where
    T: Eq + Hash,
    S: BuildHasher,
{
    overlap(a, b).jaccard()
}

/// Overlap of two strictly ascending ID arrays by two-pointer merge.
pub fn sorted_overlap(a: &[u32], b: &[u32]) -> Overlap {
    let (mut i, mut j, mut shared) = (0, 0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                shared += 1;
                i += 1;
                j += 1;
            }
        }
    }
    Overlap::from_sizes(shared, a.len(), b.len())
}

/// Asymmetric overlap `|q ∩ c| / |q|` and the shared count. Not a Jaccard
/// index: a candidate with every dependency of `q` scores 1.0 however many
/// extra dependencies it has.
pub fn forward_overlap<T, S>(query: &HashSet<T, S>, candidate: &HashSet<T, S>) -> (f64, u32)
where
    T: Eq + Hash,
    S: BuildHasher,
{
    if query.is_empty() {
        return (0.0, 0);
    }
    let shared = query.iter().filter(|x| candidate.contains(*x)).count();
    (shared as f64 / query.len() as f64, shared as u32)
}

/// Largest Jaccard two sets of these sizes could reach:
/// `min / max`, reached when the smaller set is contained in the larger.
pub fn size_upper_bound(a_len: usize, b_len: usize) -> f64 {
    let (lo, hi) = if a_len <= b_len { (a_len, b_len) } else { (b_len, a_len) };
    if hi == 0 { 0.0 } else { lo as f64 / hi as f64 }
}

/// False only when no pair of sets with these sizes can meet `threshold`.
#[inline]
pub fn passes_size_bound(a_len: usize, b_len: usize, threshold: f64) -> bool {
    size_upper_bound(a_len, b_len) >= threshold
}
