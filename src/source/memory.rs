//! In-memory data source.
//!
//! The reference implementation of `PackageDataSource`. Edges live in
//! HashMaps behind RwLocks; both views (forward and reverse) are updated on
//! every insert.
//!
//! Use this source for:
//! - Testing the engine without a network
//! - Injecting per-package failures and latency
//! - Embedding with a pre-built dependency snapshot

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::model::PackageName;
use super::{parse_names, FetchError, FetchResult, PackageDataSource};

// ============================================================================
// MemorySource
// ============================================================================

/// In-memory dependency graph. Cloning shares the same graph.
#[derive(Clone)]
pub struct MemorySource {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    domain: String,
    /// package → declared dependencies, insertion order
    forward: RwLock<HashMap<PackageName, Vec<PackageName>>>,
    /// dependency → dependents, insertion order
    reverse: RwLock<HashMap<PackageName, Vec<PackageName>>>,
    /// every package seen on either side of an edge
    known: RwLock<HashSet<PackageName>>,
    failures: RwLock<HashMap<PackageName, FetchError>>,
    latency: RwLock<HashMap<PackageName, Duration>>,
    forward_calls: AtomicU64,
    reverse_calls: AtomicU64,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self::with_domain("memory")
    }

    pub fn with_domain(domain: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                domain: domain.into(),
                forward: RwLock::new(HashMap::new()),
                reverse: RwLock::new(HashMap::new()),
                known: RwLock::new(HashSet::new()),
                failures: RwLock::new(HashMap::new()),
                latency: RwLock::new(HashMap::new()),
                forward_calls: AtomicU64::new(0),
                reverse_calls: AtomicU64::new(0),
            }),
        }
    }

    /// Build from `(package, dependency)` edges. Unusable names are skipped.
    pub fn from_edges<'a>(edges: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let source = Self::new();
        for (pkg, dep) in edges {
            source.add_dependency(pkg, dep);
        }
        source
    }

    /// Record that `pkg` depends on `dep`. Duplicate edges are ignored.
    pub fn add_dependency(&self, pkg: &str, dep: &str) {
        self.add_dependencies(pkg, [dep]);
    }

    /// Record `pkg`'s dependency list as an upstream registry would return
    /// it. Unusable names are dropped and edges already present are ignored;
    /// an empty list still makes `pkg` known, so forward fetches succeed.
    pub fn add_dependencies<I, T>(&self, pkg: &str, deps: I)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let Some(pkg) = PackageName::normalized(pkg) else {
            return;
        };
        let deps = parse_names(deps);
        {
            let mut known = self.inner.known.write();
            known.insert(pkg.clone());
            known.extend(deps.iter().cloned());
        }
        let added: Vec<PackageName> = {
            let mut fwd = self.inner.forward.write();
            let existing = fwd.entry(pkg.clone()).or_default();
            let fresh: Vec<PackageName> = deps.into_iter().filter(|d| !existing.contains(d)).collect();
            existing.extend(fresh.iter().cloned());
            fresh
        };
        let mut rev = self.inner.reverse.write();
        for dep in added {
            rev.entry(dep).or_default().push(pkg.clone());
        }
    }

    /// Make every fetch for `pkg` fail with `err`.
    pub fn fail_with(&self, pkg: &str, err: FetchError) {
        if let Some(pkg) = PackageName::normalized(pkg) {
            self.inner.failures.write().insert(pkg, err);
        }
    }

    pub fn clear_failure(&self, pkg: &str) {
        if let Some(pkg) = PackageName::normalized(pkg) {
            self.inner.failures.write().remove(&pkg);
        }
    }

    /// Delay every fetch for `pkg` by `delay`.
    pub fn set_latency(&self, pkg: &str, delay: Duration) {
        if let Some(pkg) = PackageName::normalized(pkg) {
            self.inner.latency.write().insert(pkg, delay);
        }
    }

    pub fn forward_calls(&self) -> u64 {
        self.inner.forward_calls.load(Ordering::Relaxed)
    }

    pub fn reverse_calls(&self) -> u64 {
        self.inner.reverse_calls.load(Ordering::Relaxed)
    }

    /// Every package seen, sorted.
    pub fn packages(&self) -> Vec<PackageName> {
        let mut all: Vec<_> = self.inner.known.read().iter().cloned().collect();
        all.sort();
        all
    }

    /// Snapshot of the reverse view, for building index records.
    pub fn reverse_edges(&self) -> Vec<(PackageName, Vec<PackageName>)> {
        let mut edges: Vec<_> = self
            .inner
            .reverse
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        edges.sort_by(|a, b| a.0.cmp(&b.0));
        edges
    }

    async fn before_fetch(&self, name: &PackageName) -> FetchResult<()> {
        let delay = self.inner.latency.read().get(name).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.inner.failures.read().get(name) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

// ============================================================================
// PackageDataSource impl
// ============================================================================

#[async_trait]
impl PackageDataSource for MemorySource {
    fn domain(&self) -> &str {
        &self.inner.domain
    }

    async fn fetch_forward_dependencies(&self, name: &PackageName) -> FetchResult<Vec<PackageName>> {
        self.inner.forward_calls.fetch_add(1, Ordering::Relaxed);
        self.before_fetch(name).await?;
        if !self.inner.known.read().contains(name) {
            return Err(FetchError::NotFound(name.to_string()));
        }
        Ok(self.inner.forward.read().get(name).cloned().unwrap_or_default())
    }

    async fn fetch_reverse_dependents(&self, name: &PackageName) -> FetchResult<Vec<PackageName>> {
        self.inner.reverse_calls.fetch_add(1, Ordering::Relaxed);
        self.before_fetch(name).await?;
        Ok(self.inner.reverse.read().get(name).cloned().unwrap_or_default())
    }
}

// ============================================================================
// Tests
// ============================================================================
