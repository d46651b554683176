//! Resilience primitives around expensive external calls.
//!
//! - [`ResilientGenerator`]: retry with backoff plus a content-addressed
//!   response cache around a generation transport
//! - [`CircuitBreaker`]: process-wide failure gate checked before each run

mod breaker;
mod cache;
mod client;
mod retry;

pub use breaker::{CircuitBreaker, CircuitBreakerState};
pub use cache::{
    CacheEntry, CacheMetadata, Fingerprint, InMemoryResponseCache, JsonFileResponseCache,
    ResponseCache,
};
pub use client::{is_unavailable, ResilientGenerator, UNAVAILABLE_SENTINEL};
pub use retry::{BackoffStrategy, RetryConfig, RetryState};
