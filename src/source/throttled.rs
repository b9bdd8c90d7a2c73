//! Limiter- and retry-wrapped data source.
//!
//! ```text
//! fetch → RetryPolicy ─┬─ attempt → ConcurrencyLimiter permit
//!                      │           → RateLimiter slot (per domain)
//!                      │           → inner source
//!                      └─ transient error? back off, try again
//! ```

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::LimiterConfig;
use crate::limiter::{ConcurrencyLimiter, RateLimiter, RetryPolicy};
use crate::model::PackageName;
use super::{FetchError, FetchResult, PackageDataSource};

/// Wraps a source so every dispatch holds a concurrency slot, respects the
/// per-domain spacing, and retries transient failures.
pub struct ThrottledSource<S> {
    inner: S,
    concurrency: ConcurrencyLimiter,
    rate: RateLimiter,
    retry: RetryPolicy,
}

impl<S: PackageDataSource> ThrottledSource<S> {
    pub fn new(inner: S, config: &LimiterConfig) -> Self {
        Self {
            inner,
            concurrency: ConcurrencyLimiter::new(config.max_concurrency),
            rate: RateLimiter::new(Duration::from_millis(config.min_interval_ms)),
            retry: RetryPolicy::from_config(config),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn concurrency(&self) -> &ConcurrencyLimiter {
        &self.concurrency
    }

    async fn attempt<T, Fut>(&self, fetch: Fut) -> FetchResult<T>
    where
        Fut: Future<Output = FetchResult<T>>,
    {
        let _permit = self
            .concurrency
            .acquire()
            .await
            .map_err(|_| FetchError::LimiterClosed)?;
        self.rate.until_ready(self.inner.domain()).await;
        fetch.await
    }
}

#[async_trait]
impl<S: PackageDataSource> PackageDataSource for ThrottledSource<S> {
    fn domain(&self) -> &str {
        self.inner.domain()
    }

    async fn fetch_forward_dependencies(&self, name: &PackageName) -> FetchResult<Vec<PackageName>> {
        self.retry
            .run(name.as_str(), || self.attempt(self.inner.fetch_forward_dependencies(name)))
            .await
    }

    async fn fetch_reverse_dependents(&self, name: &PackageName) -> FetchResult<Vec<PackageName>> {
        self.retry
            .run(name.as_str(), || self.attempt(self.inner.fetch_reverse_dependents(name)))
            .await
    }
}
