//! Retry-with-backoff executor
//!
//! Wraps asynchronous actions with bounded retries, exponential backoff and
//! jitter. Only rate limiting and request timeouts are retried; every other
//! error aborts immediately. When an operation key is supplied the executor
//! consults the deduplication registry before doing any work, and the
//! response cache for read-kind operations.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument;

use ltk_common::Error;

use crate::cache::ResponseCache;
use crate::dedup::OperationRegistry;

/// Whether an operation reads or mutates backend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Idempotent read; result may be served from and written to the cache
    Read,
    /// State-changing write; never cached
    Write,
}

/// One logical unit of work, identified for deduplication and caching.
#[derive(Debug, Clone)]
pub struct Operation {
    /// Stable key per logical action plus parameters
    pub key: String,
    /// Read or write
    pub kind: OperationKind,
}

impl Operation {
    /// New read-kind operation
    pub fn read<S>(key: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            key: key.into(),
            kind: OperationKind::Read,
        }
    }

    /// New write-kind operation
    pub fn write<S>(key: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            key: key.into(),
            kind: OperationKind::Write,
        }
    }
}

/// Retry configuration attached to an operation class.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first (>= 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on the exponential delay
    pub max_delay: Duration,
    /// Random jitter as a fraction (0..=1) of the computed delay
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_ratio: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Effective delay before retry number `retry_index` (zero-based):
    /// `min(initial * 2^retry_index, max)` plus up to `jitter_ratio` of that
    /// value.
    pub(crate) fn backoff_delay(&self, retry_index: u32) -> Duration {
        let base = match 2u32.checked_pow(retry_index) {
            Some(factor) => self.initial_delay.saturating_mul(factor).min(self.max_delay),
            None => self.max_delay,
        };
        let ratio = self.jitter_ratio.clamp(0.0, 1.0);
        if ratio == 0.0 {
            return base;
        }
        let jitter = base.mul_f64(rand::rng().random_range(0.0..=ratio));
        base.saturating_add(jitter)
    }
}

/// Executor running actions under a retry policy, with key-based
/// deduplication and read-result caching.
///
/// The dedup key is held around the whole multi-attempt run, not per attempt,
/// and released on every exit path.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    registry: Arc<OperationRegistry>,
    cache: Arc<ResponseCache>,
}

impl RetryExecutor {
    /// New executor over the given registry and cache.
    pub fn new(registry: Arc<OperationRegistry>, cache: Arc<ResponseCache>) -> Self {
        Self { registry, cache }
    }

    /// The deduplication registry this executor consults.
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// The response cache this executor consults for read operations.
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Run `action` under `policy`.
    ///
    /// With an operation supplied, fails fast with
    /// [`Error::DuplicateOperation`] if the key is already in flight. Read
    /// operations should go through [`execute_read`](Self::execute_read) to
    /// get cache behavior; this entry point never touches the cache.
    #[instrument(skip_all)]
    pub async fn execute<T, F, Fut>(
        &self,
        operation: Option<Operation>,
        policy: &RetryPolicy,
        action: F,
    ) -> Result<T, Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let _guard = match &operation {
            Some(op) => Some(
                self.registry
                    .try_acquire(&op.key)
                    .ok_or_else(|| Error::DuplicateOperation(op.key.clone()))?,
            ),
            None => None,
        };

        self.run_attempts(policy, &action).await
    }

    /// Run a read-kind `action` under `policy`, serving and refreshing the
    /// cache.
    ///
    /// On a valid cache hit the action is not invoked at all. A fresh entry
    /// is written only after a successful read.
    #[instrument(skip_all, fields(op = %operation.key))]
    pub async fn execute_read<T, F, Fut>(
        &self,
        operation: Operation,
        policy: &RetryPolicy,
        action: F,
    ) -> Result<T, Error>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let _guard = self
            .registry
            .try_acquire(&operation.key)
            .ok_or_else(|| Error::DuplicateOperation(operation.key.clone()))?;

        if operation.kind == OperationKind::Read {
            if let Some(hit) = self.cache.get_as::<T>(&operation.key)? {
                tracing::trace!("Cache hit for `{}`", operation.key);
                return Ok(hit);
            }
        }

        let result = self.run_attempts(policy, &action).await?;

        if operation.kind == OperationKind::Read {
            self.cache.set_value(&operation.key, &result)?;
        }

        Ok(result)
    }

    async fn run_attempts<T, F, Fut>(&self, policy: &RetryPolicy, action: &F) -> Result<T, Error>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt: u32 = 0;

        loop {
            match action().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(Error::RetriesExhausted {
                            attempts: max_attempts,
                            last: Box::new(err),
                        });
                    }
                    let delay = policy.backoff_delay(attempt - 1);
                    tracing::warn!(
                        "Attempt {}/{} failed with retryable error: {}. Retrying in {:?}",
                        attempt,
                        max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
