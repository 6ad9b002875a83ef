use crate::data::{FailureKind, FetchKind, FetchOutcome};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// One attempt against an external data producer.
///
/// Implementations own the whole lifecycle of whatever they start: when
/// `run` returns, nothing it spawned may still be running.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn run(&self, kind: FetchKind, url: &str) -> FetchOutcome;
}

/// Exponential backoff envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay after failed attempt `attempt` (counting from 0): `base * 2^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(2))
    }
}

/// Invokes a worker with retries, surfacing the last failure when the
/// attempt budget runs out.
pub struct ExternalProducer {
    worker: Arc<dyn Worker>,
    policy: RetryPolicy,
}

impl ExternalProducer {
    pub fn new(worker: Arc<dyn Worker>, policy: RetryPolicy) -> Self {
        Self { worker, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Invokes the worker with the configured retry budget
    pub async fn fetch(&self, kind: FetchKind, url: &str) -> FetchOutcome {
        self.invoke(kind, url, self.policy.max_retries).await
    }

    /// Runs up to `max_retries + 1` attempts.
    ///
    /// Every failure except the last one is followed by a backoff sleep of
    /// `base_delay * 2^attempt`. Rate-limit failures are retried the same way
    /// as other failures but logged separately.
    pub async fn invoke(&self, kind: FetchKind, url: &str, max_retries: u32) -> FetchOutcome {
        let mut attempt = 0;
        loop {
            debug!(
                "{} fetch attempt {}/{} for {}",
                kind,
                attempt + 1,
                max_retries + 1,
                url
            );

            let failure = match self.worker.run(kind, url).await {
                Ok(payload) => {
                    if attempt > 0 {
                        info!("{} fetch succeeded after {} retries", kind, attempt);
                    }
                    return Ok(payload);
                }
                Err(failure) => failure,
            };

            if attempt >= max_retries {
                warn!(
                    "{} fetch failed after {} attempt(s): {}",
                    kind,
                    attempt + 1,
                    failure
                );
                return Err(failure);
            }

            let delay = self.policy.delay_for(attempt);
            if failure.kind == FailureKind::RateLimited {
                warn!(
                    "{} fetch rate limited, retrying in {:?}: {}",
                    kind, delay, failure.detail
                );
            } else {
                warn!("{} fetch failed, retrying in {:?}: {}", kind, delay, failure);
            }
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
