//! # Fetch Substrate
//!
//! Three independent controls sit between the engine and any external
//! service:
//!
//! | Control | Bounds | Shared state |
//! |---------|--------|--------------|
//! | `ConcurrencyLimiter` | in-flight tasks (N), FIFO overflow | semaphore |
//! | `RateLimiter` | dispatch spacing per domain (D) | last-dispatch table |
//! | `RetryPolicy` | attempts on transient failure | none |
//!
//! `ThrottledSource` composes all three around a `PackageDataSource`.

pub mod rate;
pub mod concurrency;
pub mod retry;

pub use rate::RateLimiter;
pub use concurrency::ConcurrencyLimiter;
pub use retry::RetryPolicy;
