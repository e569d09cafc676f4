use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Backoff policy for calls to external providers
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Exponential backoff factor
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Preset: provider API calls (3 attempts, delays 500ms then 1s)
    ///
    /// Kept short because a user is waiting on the HTTP response.
    pub fn provider_call() -> Self {
        Self::new(3, Duration::from_millis(500)).with_max_delay(Duration::from_secs(2))
    }

    /// Preset: no retries at all
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay before the given attempt (0-indexed); the first attempt never waits
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::provider_call()
    }
}

/// Run `operation` until it succeeds, the attempts run out, or `should_retry`
/// rejects an error. The last error is returned on failure.
///
/// # Panics
/// Panics if `config.max_attempts` is 0
pub async fn with_retry_if<T, E, F, Fut, P>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    assert!(
        config.max_attempts >= 1,
        "RetryConfig.max_attempts must be >= 1, got {}",
        config.max_attempts
    );

    let mut attempt = 0;
    loop {
        let delay = config.delay_for_attempt(attempt);
        if !delay.is_zero() {
            debug!(
                "{}: retry {}/{} after {:?}",
                operation_name,
                attempt + 1,
                config.max_attempts,
                delay
            );
            sleep(delay).await;
        }

        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !should_retry(&error) {
            debug!("{}: not retryable: {}", operation_name, error);
            return Err(error);
        }

        attempt += 1;
        if attempt >= config.max_attempts {
            warn!(
                "{}: giving up after {} attempts: {}",
                operation_name, config.max_attempts, error
            );
            return Err(error);
        }

        warn!(
            "{}: attempt {}/{} failed ({}), retrying",
            operation_name, attempt, config.max_attempts, error
        );
    }
}

/// Retry every error
pub async fn with_retry<T, E, F, Fut>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    with_retry_if(config, operation_name, operation, |_| true).await
}

/// Whether a provider failure is transient.
///
/// HTTP 429 and 5xx responses are retried, as are transport errors (no
/// [`ProviderStatus`] in the chain). Other 4xx responses fail immediately.
pub fn is_transient(error: &anyhow::Error) -> bool {
    match error.downcast_ref::<ProviderStatus>() {
        Some(ProviderStatus { status, .. }) => *status == 429 || *status >= 500,
        None => true,
    }
}

/// A non-success HTTP status returned by an external provider
#[derive(Debug, thiserror::Error)]
#[error("{provider} API error: {status} - {body}")]
pub struct ProviderStatus {
    pub provider: &'static str,
    pub status: u16,
    pub body: String,
}
