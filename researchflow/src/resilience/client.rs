//! Retrying, caching wrapper around a generation transport.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cache::{CacheEntry, Fingerprint, ResponseCache};
use super::retry::{RetryConfig, RetryState};
use crate::errors::GenerationError;
use crate::providers::{GenerationRequest, GenerationTransport};

/// Text returned in place of a response once retries are exhausted.
pub const UNAVAILABLE_SENTINEL: &str = "[GENERATION_UNAVAILABLE]";

/// Returns true if `text` is the unavailable sentinel.
#[must_use]
pub fn is_unavailable(text: &str) -> bool {
    text.trim() == UNAVAILABLE_SENTINEL
}

/// Generation client with write-through caching and retry with backoff.
///
/// - A cache hit (with `use_cache`) returns the stored text without calling
///   the transport.
/// - Retryable errors (rate limiting, transient unavailability, timeouts) are
///   retried up to `max_attempts` with backoff sleeps between attempts.
/// - Non-retryable errors are returned immediately.
/// - Exhausted retries return [`UNAVAILABLE_SENTINEL`] instead of an error.
/// - Successful responses are stored before being returned. The sentinel is
///   never stored.
#[derive(Clone)]
pub struct ResilientGenerator {
    transport: Arc<dyn GenerationTransport>,
    cache: Arc<dyn ResponseCache>,
    retry: RetryConfig,
}

impl std::fmt::Debug for ResilientGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientGenerator")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ResilientGenerator {
    /// Creates a generator with the default retry policy.
    #[must_use]
    pub fn new(transport: Arc<dyn GenerationTransport>, cache: Arc<dyn ResponseCache>) -> Self {
        Self {
            transport,
            cache,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The retry policy.
    #[must_use]
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Generates text for a request.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let fingerprint = Fingerprint::of(&request.model, &request.messages);

        if request.use_cache {
            if let Some(entry) = self.cache.get(&fingerprint).await {
                debug!(fingerprint = %fingerprint, model = %request.model, "Generation cache hit");
                return Ok(entry.response);
            }
        }
        debug!(fingerprint = %fingerprint, model = %request.model, "Generation cache miss");

        let mut state = RetryState::new();
        loop {
            match self.transport.complete(request).await {
                Ok(text) => {
                    self.cache
                        .put(CacheEntry::new(fingerprint, request.model.clone(), text.clone()))
                        .await;
                    return Ok(text);
                }
                Err(error) if error.is_retryable() => match state.next_delay(&self.retry) {
                    Some(delay) => {
                        info!(
                            attempt = state.attempt,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            error = %error,
                            "Retrying generation request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        warn!(attempts = state.attempt, error = %error, "Generation unavailable after retries");
                        return Ok(UNAVAILABLE_SENTINEL.to_string());
                    }
                },
                Err(error) => {
                    warn!(error = %error, "Generation request failed");
                    return Err(error);
                }
            }
        }
    }
}
