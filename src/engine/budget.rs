//! Stage budgets and bounded concurrent fetching.
//!
//! Every live fetch the engine makes goes through `fetch_all`: one task per
//! name, each holding a `ConcurrencyLimiter` slot while it runs, all
//! collected until the stage deadline. On expiry the remaining tasks are
//! aborted and whatever already arrived is returned.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::limiter::ConcurrencyLimiter;
use crate::model::PackageName;
use crate::source::{FetchError, PackageDataSource};
use crate::Error;

/// A named stage with a wall-clock deadline.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Stage {
    pub name: &'static str,
    pub budget: Duration,
    pub deadline: Instant,
}

impl Stage {
    pub fn start(name: &'static str, budget: Duration) -> Self {
        Self {
            name,
            budget,
            deadline: Instant::now() + budget,
        }
    }

    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn timeout_error(&self) -> Error {
        Error::Timeout {
            stage: self.name,
            budget_ms: self.budget.as_millis() as u64,
        }
    }
}

/// Which side of the graph to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchKind {
    Forward,
    Reverse,
}

/// Outcome of a batch of fetches.
#[derive(Debug, Default)]
pub(crate) struct FetchBatch {
    /// Successful fetches, sorted by name.
    pub ok: Vec<(PackageName, Vec<PackageName>)>,
    pub attempted: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl FetchBatch {
    pub fn succeeded(&self) -> usize {
        self.ok.len()
    }
}

/// Fetch one side of the graph for every name, bounded by `limiter`, until
/// `stage` expires. Individual failures are logged and counted, never
/// returned.
pub(crate) async fn fetch_all<S: PackageDataSource>(
    source: &Arc<S>,
    limiter: &ConcurrencyLimiter,
    stage: Stage,
    kind: FetchKind,
    names: Vec<PackageName>,
) -> FetchBatch {
    let mut batch = FetchBatch {
        attempted: names.len(),
        ..FetchBatch::default()
    };
    if names.is_empty() {
        return batch;
    }

    let mut tasks = JoinSet::new();
    for name in names {
        let source = Arc::clone(source);
        let limiter = limiter.clone();
        tasks.spawn(async move {
            let result = match limiter.acquire().await {
                Ok(_permit) => match kind {
                    FetchKind::Forward => source.fetch_forward_dependencies(&name).await,
                    FetchKind::Reverse => source.fetch_reverse_dependents(&name).await,
                },
                Err(_) => Err(FetchError::LimiterClosed),
            };
            (name, result)
        });
    }

    loop {
        match tokio::time::timeout_at(stage.deadline, tasks.join_next()).await {
            Ok(Some(Ok((name, Ok(list))))) => batch.ok.push((name, list)),
            Ok(Some(Ok((name, Err(e))))) => {
                batch.failed += 1;
                tracing::debug!(stage = stage.name, error = %e.into_error(&name), "fetch failed, skipping");
            }
            Ok(Some(Err(join_error))) => {
                batch.failed += 1;
                tracing::warn!(stage = stage.name, error = %join_error, "fetch task died");
            }
            Ok(None) => break,
            Err(_) => {
                batch.cancelled = tasks.len();
                tasks.abort_all();
                tracing::warn!(
                    error = %stage.timeout_error(),
                    cancelled = batch.cancelled,
                    completed = batch.ok.len(),
                    "stage budget exhausted, continuing with partial data",
                );
                break;
            }
        }
    }

    batch.ok.sort_by(|a, b| a.0.cmp(&b.0));
    batch
}

/// Fetch a single name under its own stage. `None` on failure or timeout.
pub(crate) async fn fetch_one<S: PackageDataSource>(
    source: &Arc<S>,
    limiter: &ConcurrencyLimiter,
    stage: Stage,
    kind: FetchKind,
    name: &PackageName,
) -> Option<Vec<PackageName>> {
    let batch = fetch_all(source, limiter, stage, kind, vec![name.clone()]).await;
    batch.ok.into_iter().next().map(|(_, list)| list)
}
