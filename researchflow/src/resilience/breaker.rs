//! Process-wide circuit breaker gating pipeline runs.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    /// Failures recorded so far.
    pub failures: u32,
    /// Failures at which the breaker opens.
    pub threshold: u32,
}

impl CircuitBreakerState {
    /// Returns true once failures have reached the threshold.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.failures >= self.threshold
    }
}

/// A failure counter with a fixed threshold.
///
/// Shared as `Arc<CircuitBreaker>` between runs. Once open it stays open
/// until [`CircuitBreaker::reset`] is called.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    failures: Mutex<u32>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(3)
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            failures: Mutex::new(0),
        }
    }

    /// Whether runs may proceed.
    #[must_use]
    pub fn ok(&self) -> bool {
        !self.is_open()
    }

    /// Whether the breaker has tripped.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.failures.lock() >= self.threshold
    }

    /// Records a failure and returns the new count.
    pub fn record_failure(&self) -> u32 {
        let mut failures = self.failures.lock();
        *failures = failures.saturating_add(1);
        if *failures == self.threshold {
            warn!(failures = *failures, threshold = self.threshold, "Circuit breaker opening");
        }
        *failures
    }

    /// Failures recorded so far.
    #[must_use]
    pub fn failures(&self) -> u32 {
        *self.failures.lock()
    }

    /// The configured threshold.
    #[must_use]
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Closes the breaker.
    pub fn reset(&self) {
        *self.failures.lock() = 0;
    }

    /// Returns a snapshot of the breaker.
    #[must_use]
    pub fn snapshot(&self) -> CircuitBreakerState {
        CircuitBreakerState {
            failures: self.failures(),
            threshold: self.threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_opens_at_threshold() {
        let breaker = CircuitBreaker::new(3);
        assert!(breaker.ok());
        breaker.record_failure();
        breaker.record_failure();
        assert!(breaker.ok());
        assert_eq!(breaker.record_failure(), 3);
        assert!(breaker.is_open());
        assert!(breaker.snapshot().is_open());
    }

    #[test]
    fn test_reset_closes() {
        let breaker = CircuitBreaker::new(1);
        breaker.record_failure();
        assert!(breaker.is_open());
        breaker.reset();
        assert!(breaker.ok());
        assert_eq!(breaker.failures(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_failures_are_not_lost() {
        let breaker = Arc::new(CircuitBreaker::new(1000));
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let breaker = Arc::clone(&breaker);
                tokio::spawn(async move {
                    for _ in 0..10 {
                        breaker.record_failure();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(breaker.failures(), 500);
    }
}
