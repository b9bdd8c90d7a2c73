//! End-to-end tests for stage budgets and the throttled data source.
//!
//! All tests run on a paused clock: sleeps and deadlines advance instantly,
//! so a 60s fetch against a sub-second budget finishes immediately.

use depsim::{
    Catalog, EngineConfig, FetchError, IndexStore, LimiterConfig, MemoryIndexProvider, MemorySource,
    PackageName, QueryOptions, SimilarityEngine, StageBudget, ThrottledSource,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn names(items: &[&str]) -> Vec<PackageName> {
    items.iter().map(|s| PackageName::parse(s).unwrap()).collect()
}

fn tight_config() -> EngineConfig {
    EngineConfig {
        stage_budget: StageBudget { base_ms: 100, per_item_ms: 10, max_ms: 1_000 },
        ..EngineConfig::default()
    }
}

// ============================================================================
// 1. Slow fetches are cut off, partial data still ranks
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_slow_expansion_is_cancelled() {
    let mut index = MemoryIndexProvider::new();
    index.insert_reverse("flask", ["u1", "u2"]);
    index.insert_reverse("quart", ["u1", "u2"]);
    let source = MemorySource::from_edges([("u1", "sanic"), ("u2", "sanic")]);
    source.set_latency("u1", Duration::from_secs(60));
    source.set_latency("u2", Duration::from_secs(60));

    let engine = SimilarityEngine::new(
        source,
        IndexStore::new(Arc::new(index)),
        Catalog::new(names(&["quart"])),
        tight_config(),
    )
    .unwrap();

    let start = Instant::now();
    let result = engine.compute_similar("flask", 5, QueryOptions::default()).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(60));
    assert_eq!(result.names(), vec!["quart"]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_live_scoring_keeps_fast_results() {
    let mut index = MemoryIndexProvider::new();
    index.insert_reverse("flask", ["u1", "u2"]);
    let source = MemorySource::from_edges([
        ("u1", "quart"),
        ("u2", "quart"),
        ("u1", "sanic"),
        ("u2", "sanic"),
    ]);
    source.set_latency("sanic", Duration::from_secs(60));

    let engine = SimilarityEngine::new(
        source,
        IndexStore::new(Arc::new(index)),
        Catalog::new(names(&["sanic", "quart"])),
        tight_config(),
    )
    .unwrap();

    let result = engine.compute_similar("flask", 5, QueryOptions::default()).await.unwrap();
    assert_eq!(result.names(), vec!["quart"]);
}

#[tokio::test(start_paused = true)]
async fn test_slow_cooccurrence_sample_is_partial() {
    let mut index = MemoryIndexProvider::new();
    index.insert_reverse("pytest", ["p1", "p2"]);
    let source = MemorySource::from_edges([("p1", "pytest-cov"), ("p2", "pytest-cov")]);
    source.set_latency("p2", Duration::from_secs(60));

    let engine = SimilarityEngine::new(
        source,
        IndexStore::new(Arc::new(index)),
        Catalog::default(),
        tight_config(),
    )
    .unwrap();

    // Only p1 arrives: 1 of 2 sampled, one shared dependent is enough.
    let result = engine.compute_cooccurrence("pytest", 5, QueryOptions::default()).await.unwrap();
    assert_eq!(result.names(), vec!["pytest-cov"]);
    assert_eq!(result.get("pytest-cov").unwrap().shared_count, 1);
}

// ============================================================================
// 2. Throttled source
// ============================================================================

fn limiter_config() -> LimiterConfig {
    LimiterConfig {
        max_concurrency: 2,
        min_interval_ms: 10,
        retry_attempts: 3,
        backoff_base_ms: 20,
        backoff_max_ms: 80,
    }
}

#[tokio::test(start_paused = true)]
async fn test_engine_over_throttled_source() {
    let mut index = MemoryIndexProvider::new();
    index.insert_reverse("flask", ["u1", "u2"]);
    let inner = MemorySource::from_edges([("u1", "quart"), ("u2", "quart")]);
    let source = ThrottledSource::new(inner.clone(), &limiter_config());

    let engine = SimilarityEngine::new(
        source,
        IndexStore::new(Arc::new(index)),
        Catalog::default(),
        EngineConfig::default(),
    )
    .unwrap();

    let result = engine.compute_similar("flask", 5, QueryOptions::default()).await.unwrap();
    assert_eq!(result.names(), vec!["quart"]);
    assert_eq!(result.get("quart").unwrap().jaccard, 1.0);
    assert_eq!(inner.reverse_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transient_failures_are_retried_then_skipped() {
    let mut index = MemoryIndexProvider::new();
    index.insert_reverse("flask", ["u1"]);
    let inner = MemorySource::from_edges([("u1", "quart")]);
    inner.fail_with("quart", FetchError::Http { status: 503 });
    inner.fail_with("u1", FetchError::NotFound("u1".into()));
    let source = ThrottledSource::new(inner.clone(), &limiter_config());

    let engine = SimilarityEngine::new(
        source,
        IndexStore::new(Arc::new(index)),
        Catalog::new(names(&["quart"])),
        EngineConfig::default(),
    )
    .unwrap();

    let result = engine.compute_similar("flask", 5, QueryOptions::default()).await.unwrap();
    assert!(!result.contains("quart"));
    assert_eq!(inner.reverse_calls(), 3, "three attempts on quart");
    assert_eq!(inner.forward_calls(), 1, "permanent failure is not retried");
}

// ============================================================================
// 3. Slow index loads
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_slow_id_table_is_bounded_by_prioritize_stage() {
    let mut index = MemoryIndexProvider::new().with_slow_record("bitset/ids", Duration::from_secs(60));
    index.insert_reverse("serde", ["u1", "u2", "u3", "u4"]);
    index.insert_bitset("bincode", ["u1", "u2", "u3", "v1"]);

    let engine = SimilarityEngine::new(
        MemorySource::new(),
        IndexStore::new(Arc::new(index)),
        Catalog::new(names(&["bincode"])),
        tight_config(),
    )
    .unwrap();

    let start = Instant::now();
    let result = engine.compute_similar("serde", 5, QueryOptions::default()).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(60));
    assert!(!result.contains("bincode"));
}
