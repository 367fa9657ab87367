//! Bounded retry with exponential backoff and jitter.

use crate::config::RetryConfig;
use crate::error::SyncError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Classifies failures as worth retrying or not.
pub trait Retryable {
    /// Returns true if a later attempt may succeed.
    fn is_retryable(&self) -> bool;
}

impl Retryable for SyncError {
    fn is_retryable(&self) -> bool {
        SyncError::is_retryable(self)
    }
}

type ShouldRetry<E> = Arc<dyn Fn(&E, u32) -> bool + Send + Sync>;
type OnRetry<E> = Arc<dyn Fn(&E, u32, Duration) + Send + Sync>;

/// Executes fallible async operations with bounded retries.
///
/// After `max_attempts` failures the last error is returned unchanged so
/// callers can match on the original failure.
pub struct RetryPolicy<E> {
    config: RetryConfig,
    should_retry: Option<ShouldRetry<E>>,
    on_retry: Option<OnRetry<E>>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            should_retry: self.should_retry.clone(),
            on_retry: self.on_retry.clone(),
        }
    }
}

impl<E> std::fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .field("should_retry", &self.should_retry.is_some())
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl<E: Retryable + std::fmt::Display> RetryPolicy<E> {
    /// Creates a policy that classifies errors with [`Retryable`].
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            should_retry: None,
            on_retry: None,
        }
    }

    /// Replaces the default classifier.
    ///
    /// The closure receives the error and the 1-indexed attempt that failed.
    pub fn with_should_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&E, u32) -> bool + Send + Sync + 'static,
    {
        self.should_retry = Some(Arc::new(f));
        self
    }

    /// Registers a hook called before each wait with the error, the
    /// attempt that failed and the chosen delay.
    pub fn with_on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&E, u32, Duration) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(f));
        self
    }

    /// Returns the retry configuration.
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn should_retry(&self, error: &E, attempt: u32) -> bool {
        match &self.should_retry {
            Some(f) => f(error, attempt),
            None => error.is_retryable(),
        }
    }

    /// Runs `operation` until it succeeds, a non-retryable error occurs, or
    /// the attempt budget is spent.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if attempt >= max_attempts || !self.should_retry(&error, attempt) {
                if attempt > 1 {
                    warn!(attempt, error = %error, "giving up after retries");
                }
                return Err(error);
            }

            let delay = self.config.delay_for_attempt(attempt);
            debug!(attempt, ?delay, error = %error, "retrying after failure");
            if let Some(on_retry) = &self.on_retry {
                on_retry(&error, attempt, delay);
            }
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
