
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{Embedding, EmbeddingClient, EmbeddingError};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(5);

/// Bounded exponential backoff for transient provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per embedding call, including the first.
    pub max_retries: u32,
    /// Delay after the first failed attempt; doubles on each further failure.
    pub base_delay: Duration,
    /// Also retry when the provider is unreachable, not only when throttled.
    pub retry_unavailable: bool,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            retry_unavailable: true,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after failed attempt `attempt` (0-indexed).
    #[inline]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2_u32.saturating_pow(attempt))
    }

    #[inline]
    pub fn is_retryable(&self, error: &EmbeddingError) -> bool {
        match error {
            EmbeddingError::RateLimited { .. } => true,
            EmbeddingError::Unavailable(_) => self.retry_unavailable,
            EmbeddingError::Provider(_) => false,
        }
    }
}

type SleepFn = Box<dyn Fn(Duration) + Send + Sync>;

/// Wraps an [`EmbeddingClient`] with a [`RetryPolicy`].
///
/// A batch is retried as a whole. When the attempts run out, the last failure
/// is returned as-is so callers can still tell throttling from an outage.
pub struct ResilientEmbedder<C> {
    client: C,
    policy: RetryPolicy,
    sleep: SleepFn,
}

impl<C: EmbeddingClient> ResilientEmbedder<C> {
    #[inline]
    pub fn new(client: C, policy: RetryPolicy) -> Self {
        Self {
            client,
            policy,
            sleep: Box::new(std::thread::sleep),
        }
    }

    /// Replace the blocking sleep used between attempts.
    #[inline]
    pub fn with_sleep<F>(mut self, sleep: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.sleep = Box::new(sleep);
        self
    }

    #[inline]
    pub fn client(&self) -> &C {
        &self.client
    }

    #[inline]
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, EmbeddingError> {
        let max_attempts = self.policy.max_retries.max(1);
        let mut attempt = 0;

        loop {
            debug!(
                "Embedding attempt {}/{} for {} texts",
                attempt + 1,
                max_attempts,
                texts.len()
            );

            let error = match self.client.embed(texts) {
                Ok(vectors) => {
                    if attempt > 0 {
                        debug!("Embedding succeeded on attempt {}", attempt + 1);
                    }
                    return Ok(vectors);
                }
                Err(error) => error,
            };

            if !self.policy.is_retryable(&error) {
                warn!("Non-retryable embedding failure: {}", error);
                return Err(error);
            }

            if attempt + 1 >= max_attempts {
                error!("Giving up after {} attempts: {}", max_attempts, error);
                return Err(error);
            }

            let delay = self.policy.delay_for(attempt);
            warn!(
                "{}, attempt {}/{}; waiting {:?} before retrying",
                error,
                attempt + 1,
                max_attempts,
                delay
            );
            (self.sleep)(delay);
            attempt += 1;
        }
    }
}
