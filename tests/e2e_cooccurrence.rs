//! End-to-end tests for `compute_cooccurrence`.

use depsim::{
    Catalog, EngineConfig, Error, FetchError, IndexStore, MemoryIndexProvider, MemorySource,
    PackageName, QueryOptions, ScoreSource, SimilarityEngine, StrategyKind,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn engine(index: MemoryIndexProvider, source: MemorySource, catalog: Catalog) -> SimilarityEngine<MemorySource> {
    SimilarityEngine::new(
        source,
        IndexStore::new(Arc::new(index)),
        catalog,
        EngineConfig::default(),
    )
    .unwrap()
}

/// pytest has four dependents; three of them also use pytest-cov.
fn pytest_world() -> (MemoryIndexProvider, MemorySource) {
    let mut index = MemoryIndexProvider::new();
    index.insert_reverse("pytest", ["p1", "p2", "p3", "p4"]);
    let source = MemorySource::from_edges([
        ("p1", "pytest"),
        ("p1", "pytest-cov"),
        ("p1", "requests"),
        ("p1", "requests"),
        ("p2", "pytest"),
        ("p2", "pytest-cov"),
        ("p3", "pytest"),
        ("p3", "pytest-cov"),
        ("p3", "mock"),
        ("p4", "pytest"),
        ("p4", "requests"),
    ]);
    (index, source)
}

// ============================================================================
// 1. Tallying and tiered filtering
// ============================================================================

#[tokio::test]
async fn test_full_sample_uses_strictest_tier() {
    let (index, source) = pytest_world();
    let engine = engine(index, source, Catalog::default());

    let result = engine.compute_cooccurrence("pytest", 10, QueryOptions::default()).await.unwrap();

    assert_eq!(result.strategy, StrategyKind::Cooccurrence);
    // requests (2 of 4) and mock (1 of 4) miss the min-shared of 3.
    assert_eq!(result.names(), vec!["pytest-cov"]);
    let cov = result.get("pytest-cov").unwrap();
    assert_eq!(cov.source, ScoreSource::Cooccurrence);
    assert_eq!(cov.shared_count, 3);
    assert_eq!(cov.jaccard, 0.75);
}

#[tokio::test]
async fn test_low_success_rate_loosens_filter() {
    let (index, source) = pytest_world();
    for failing in ["p1", "p2", "p3"] {
        source.fail_with(failing, FetchError::Http { status: 500 });
    }
    let engine = engine(index, source, Catalog::default());

    let result = engine.compute_cooccurrence("pytest", 10, QueryOptions::default()).await.unwrap();

    assert_eq!(result.strategy, StrategyKind::Cooccurrence);
    assert_eq!(result.names(), vec!["requests"]);
    assert_eq!(result.get("requests").unwrap().jaccard, 1.0);
}

#[tokio::test]
async fn test_middle_tier() {
    let (index, source) = pytest_world();
    source.fail_with("p4", FetchError::Timeout);
    source.fail_with("p3", FetchError::Timeout);
    let engine = engine(index, source, Catalog::default());

    // 2 of 4 succeed: min-shared 2 over p1 and p2.
    let result = engine.compute_cooccurrence("pytest", 10, QueryOptions::default()).await.unwrap();
    assert_eq!(result.names(), vec!["pytest-cov"]);
    assert_eq!(result.get("pytest-cov").unwrap().jaccard, 1.0);
}

#[tokio::test]
async fn test_query_never_listed() {
    let (index, source) = pytest_world();
    let engine = engine(index, source, Catalog::default());
    let result = engine.compute_cooccurrence("pytest", 10, QueryOptions::default()).await.unwrap();
    assert!(!result.contains("pytest"));
}

#[tokio::test]
async fn test_peer_group_filters_cooccurrence() {
    let (index, source) = pytest_world();
    let catalog = Catalog::default().with_peer_group(
        "testing",
        ["pytest", "nose"].iter().map(|s| PackageName::parse(s).unwrap()).collect(),
    );
    let engine = engine(index, source, catalog);

    let options = QueryOptions { restrict_to_peer_group: true, ..QueryOptions::default() };
    let result = engine.compute_cooccurrence("pytest", 10, options).await.unwrap();
    assert!(!result.contains("pytest-cov"));
}

// ============================================================================
// 2. No dependents: direct dependencies first
// ============================================================================

#[tokio::test]
async fn test_empty_base_lists_direct_dependencies_first() {
    let source = MemorySource::from_edges([
        ("fresh", "tokio"),
        ("fresh", "serde"),
        ("axum", "tokio"),
        ("axum", "hyper"),
    ]);
    let catalog = Catalog::new(vec![PackageName::parse("axum").unwrap()]);
    let engine = engine(MemoryIndexProvider::new(), source, catalog);

    let result = engine.compute_cooccurrence("fresh", 10, QueryOptions::default()).await.unwrap();

    assert_eq!(result.strategy, StrategyKind::ForwardOverlap);
    assert_eq!(result.names(), vec!["serde", "tokio", "axum"]);
    assert_eq!(result.scores[0].source, ScoreSource::DirectDependency);
    assert_eq!(result.scores[0].jaccard, 1.0);
    let axum = result.get("axum").unwrap();
    assert_eq!(axum.source, ScoreSource::ForwardOverlap);
    assert_eq!(axum.jaccard, 0.5);
}

#[tokio::test]
async fn test_direct_dependencies_respect_limit() {
    let source = MemorySource::from_edges([("fresh", "tokio"), ("fresh", "serde")]);
    let engine = engine(MemoryIndexProvider::new(), source, Catalog::default());

    let result = engine.compute_cooccurrence("fresh", 1, QueryOptions::default()).await.unwrap();
    assert_eq!(result.names(), vec!["serde"]);
}

#[tokio::test]
async fn test_unknown_package_is_empty() {
    let engine = engine(MemoryIndexProvider::new(), MemorySource::new(), Catalog::default());
    let result = engine.compute_cooccurrence("nobody", 10, QueryOptions::default()).await.unwrap();
    assert!(result.is_empty());
    assert_eq!(result.strategy, StrategyKind::Exhausted);
}

#[tokio::test]
async fn test_cooccurrence_rejects_bad_names() {
    let engine = engine(MemoryIndexProvider::new(), MemorySource::new(), Catalog::default());
    let err = engine.compute_cooccurrence("", 10, QueryOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
}
