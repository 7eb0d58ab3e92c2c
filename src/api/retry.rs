use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cli::config::RetrySettings;
use crate::error::FetchError;

/// Capped exponential backoff with jitter, plus a separate budget for
/// rate-limit waits.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts for transient failures (first try included)
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    /// Relative jitter applied to every backoff delay (0.2 = ±20%)
    pub jitter: f64,
    pub max_delay: Duration,
    /// How many 429 responses are waited out before giving up
    pub max_rate_limit_waits: u32,
    /// Upper bound for a server supplied Retry-After hint
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            jitter: 0.2,
            max_delay: Duration::from_secs(30),
            max_rate_limit_waits: 5,
            max_retry_after: Duration::from_secs(120),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            backoff_factor: settings.backoff_factor.max(1.0),
            jitter: settings.jitter.clamp(0.0, 1.0),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            max_rate_limit_waits: settings.max_rate_limit_waits,
            max_retry_after: Duration::from_secs(settings.max_retry_after_secs),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based), before jitter
    pub fn nominal_delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16) as i32;
        let delay = self.base_delay.mul_f64(self.backoff_factor.powi(exponent));
        delay.min(self.max_delay)
    }

    /// Delay before retry number `retry` (1-based), jittered
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let delay = self.nominal_delay(retry);
        if self.jitter <= 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen_range((1.0 - self.jitter)..=(1.0 + self.jitter));
        delay.mul_f64(factor)
    }

    /// Run `op` until it succeeds, fails permanently, exhausts its budget or
    /// `cancel` fires. Cancellation interrupts both the request and the wait.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut failures = 0u32;
        let mut rate_limit_waits = 0u32;

        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                result = op() => result,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let delay = match &err {
                FetchError::RateLimited { retry_after } => {
                    if rate_limit_waits >= self.max_rate_limit_waits {
                        warn!("{}: still rate limited after {} waits, giving up", label, rate_limit_waits);
                        return Err(err);
                    }
                    rate_limit_waits += 1;
                    match retry_after {
                        Some(hint) if *hint > self.max_retry_after => {
                            warn!(
                                "{}: Retry-After of {}s exceeds the {}s cap",
                                label,
                                hint.as_secs(),
                                self.max_retry_after.as_secs()
                            );
                            self.max_retry_after
                        }
                        Some(hint) => *hint,
                        None => self.backoff_delay(rate_limit_waits),
                    }
                }
                err if err.is_transient() => {
                    failures += 1;
                    if failures >= self.max_attempts {
                        warn!("{}: giving up after {} attempts: {}", label, failures, err);
                        return Err(err.clone());
                    }
                    warn!("{}: attempt {} failed: {}", label, failures, err);
                    self.backoff_delay(failures)
                }
                _ => return Err(err),
            };

            debug!("{}: retrying in {}ms", label, delay.as_millis());
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = sleep(delay) => {}
            }
        }
    }
}
