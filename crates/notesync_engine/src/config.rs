//! Configuration for the sync engine and connection manager.

use rand::Rng;
use std::time::Duration;

/// Configuration for sync passes.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Retry behavior for Local Store operations.
    pub store_retry: RetryConfig,
    /// Retry behavior for remote fetch and push.
    pub remote_retry: RetryConfig,
    /// Pull remote notes that are unknown locally.
    pub pull_new_remote_notes: bool,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new() -> Self {
        Self {
            store_retry: RetryConfig::new(3).with_initial_delay(Duration::from_millis(50)),
            remote_retry: RetryConfig::new(3),
            pull_new_remote_notes: true,
        }
    }

    /// Sets the retry configuration for store operations.
    pub fn with_store_retry(mut self, retry: RetryConfig) -> Self {
        self.store_retry = retry;
        self
    }

    /// Sets the retry configuration for remote operations.
    pub fn with_remote_retry(mut self, retry: RetryConfig) -> Self {
        self.remote_retry = retry;
        self
    }

    /// Sets whether remote-only notes are pulled in.
    pub fn with_pull_new_remote_notes(mut self, enabled: bool) -> Self {
        self.pull_new_remote_notes = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Time allowed for a channel to open.
    pub connect_timeout: Duration,
    /// Interval between heartbeat pings.
    pub heartbeat_interval: Duration,
    /// Time allowed for the matching pong.
    pub pong_timeout: Duration,
    /// Backoff and attempt limit for automatic reconnection.
    pub reconnect: RetryConfig,
}

impl ConnectionConfig {
    /// Creates a configuration with the default timings.
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(5),
            reconnect: RetryConfig::new(10)
                .with_initial_delay(Duration::from_secs(1))
                .with_max_delay(Duration::from_secs(30))
                .with_backoff_multiplier(2.0),
        }
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the pong timeout.
    pub fn with_pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = timeout;
        self
    }

    /// Sets the reconnect policy.
    pub fn with_reconnect(mut self, reconnect: RetryConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.add_jitter = enabled;
        self
    }

    /// Delay before retry number `attempt` (1-indexed), without jitter.
    ///
    /// `min(initial_delay * multiplier^(attempt - 1), max_delay)`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        // powi overflows to infinity for large attempts
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }

    /// Delay before retry number `attempt` (1-indexed), with ±25% jitter
    /// when enabled.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if !self.add_jitter || base.is_zero() {
            return base;
        }
        let factor = rand::thread_rng().gen_range(0.75..=1.25);
        base.mul_f64(factor)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn connection_defaults() {
        let config = ConnectionConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.pong_timeout, Duration::from_secs(5));
        assert_eq!(config.reconnect.max_attempts, 10);
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_remote_retry(RetryConfig::no_retry())
            .with_pull_new_remote_notes(false);
        assert_eq!(config.remote_retry.max_attempts, 1);
        assert!(!config.pull_new_remote_notes);
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert_eq!(config.max_attempts, 1);
    }

    #[test]
    fn sixth_attempt_hits_the_cap() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_millis(1000))
            .with_backoff_multiplier(2.0)
            .with_max_delay(Duration::from_millis(30000));

        assert_eq!(config.base_delay(0), Duration::ZERO);
        assert_eq!(config.base_delay(1), Duration::from_millis(1000));
        assert_eq!(config.base_delay(5), Duration::from_millis(16000));
        assert_eq!(config.base_delay(6), Duration::from_millis(30000));
        assert_eq!(config.base_delay(500), Duration::from_millis(30000));
    }

    #[test]
    fn jitter_can_be_disabled() {
        let config = RetryConfig::new(3)
            .with_initial_delay(Duration::from_millis(200))
            .with_jitter(false);
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(400));
    }

    proptest! {
        #[test]
        fn jittered_delay_stays_within_band(attempt in 1u32..20) {
            let config = RetryConfig::new(20)
                .with_initial_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_secs(5));
            let base = config.base_delay(attempt).as_secs_f64();
            let delay = config.delay_for_attempt(attempt).as_secs_f64();
            prop_assert!(delay >= base * 0.75 - 1e-9);
            prop_assert!(delay <= base * 1.25 + 1e-9);
            prop_assert!(base <= 5.0);
        }
    }
}
