//! # Package Data Source Trait
//!
//! The contract between the engine and whatever supplies live dependency
//! data (a registry API, a metadata mirror, a test fixture).
//!
//! ## Implementations
//!
//! | Source | Module | Description |
//! |--------|--------|-------------|
//! | `MemorySource` | `memory` | In-memory edges for testing/embedding |
//! | `ThrottledSource` | `throttled` | Wraps any source with limiter + retry |
//!
//! Names crossing this boundary are already `PackageName`s: a source parses
//! its upstream payload and normalizes before returning, so the engine never
//! assumes anything about the wire shape.

pub mod memory;
pub mod throttled;

use async_trait::async_trait;

use crate::model::PackageName;
use crate::Error;

pub use memory::MemorySource;
pub use throttled::ThrottledSource;

// ============================================================================
// Fetch errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("package not found: {0}")]
    NotFound(String),

    #[error("request timed out")]
    Timeout,

    #[error("connection reset")]
    ConnectionReset,

    #[error("HTTP status {status}")]
    Http { status: u16 },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("fetch limiter closed")]
    LimiterClosed,
}

impl FetchError {
    /// Timeouts, resets, 429 and 5xx are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::ConnectionReset => true,
            FetchError::Http { status } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }

    /// Lift into the crate error for `package`.
    pub fn into_error(self, package: &PackageName) -> Error {
        match self {
            FetchError::RetriesExhausted { attempts, last } => Error::TransientFetch {
                attempts,
                message: format!("{package}: {last}"),
            },
            FetchError::LimiterClosed => Error::LimiterClosed,
            other => Error::DataUnavailable {
                package: package.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

// ============================================================================
// PackageDataSource Trait
// ============================================================================

/// Live dependency data for a single package.
///
/// Both operations are fallible and may be slow; the engine always calls
/// them under a stage budget and treats any error as "data unavailable".
#[async_trait]
pub trait PackageDataSource: Send + Sync + 'static {
    /// Domain key used for rate limiting. Sources talking to one service
    /// should return the same value.
    fn domain(&self) -> &str {
        "default"
    }

    /// Packages `name` declares as dependencies.
    async fn fetch_forward_dependencies(&self, name: &PackageName) -> FetchResult<Vec<PackageName>>;

    /// Packages that declare `name` as a dependency. Best-effort; an empty
    /// list is a valid answer.
    async fn fetch_reverse_dependents(&self, name: &PackageName) -> FetchResult<Vec<PackageName>>;
}

#[async_trait]
impl<S: PackageDataSource + ?Sized> PackageDataSource for std::sync::Arc<S> {
    fn domain(&self) -> &str {
        (**self).domain()
    }

    async fn fetch_forward_dependencies(&self, name: &PackageName) -> FetchResult<Vec<PackageName>> {
        (**self).fetch_forward_dependencies(name).await
    }

    async fn fetch_reverse_dependents(&self, name: &PackageName) -> FetchResult<Vec<PackageName>> {
        (**self).fetch_reverse_dependents(name).await
    }
}

/// Parse boundary for raw upstream name lists: normalize, drop unusable
/// entries, de-duplicate while keeping first-seen order.
pub fn parse_names<I, T>(raw: I) -> Vec<PackageName>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    let mut seen = hashbrown::HashSet::new();
    raw.into_iter()
        .filter_map(|r| PackageName::normalized(r.as_ref()))
        .filter(|n| seen.insert(n.clone()))
        .collect()
}
