//! Rate-limit aware retry wrapper for single remote calls
//!
//! A rate-limit signal suspends the caller for the configured backoff and then
//! re-issues the identical request; those waits never count against the retry
//! ceiling. Other transient failures (non-success status, connection errors)
//! are retried until `max_retries` is exceeded, at which point the failure
//! becomes fatal. Permanent errors are returned immediately.

use backoff::backoff::{Backoff, Constant};
use backoff::ExponentialBackoffBuilder;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{BackoffConfig, BackoffStrategy, Config};
use crate::error::{LabelerError, Result};

/// Sleep unless the delay is zero
pub(crate) async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Wait after a rate-limit signal
    pub rate_limit_backoff: Duration,
    /// Wait after a generic transient failure
    pub error_backoff: Duration,
    /// Generic failures tolerated before giving up
    pub max_retries: u32,
    /// Optional cap on consecutive rate-limit waits (None = wait forever)
    pub max_rate_limit_waits: Option<u32>,
    pub strategy: BackoffStrategy,
    pub max_interval: Duration,
    pub randomization_factor: f64,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Fixed-interval policy
    pub fn fixed(rate_limit_backoff: Duration, error_backoff: Duration, max_retries: u32) -> Self {
        let defaults = BackoffConfig::default();
        Self {
            rate_limit_backoff,
            error_backoff,
            max_retries,
            max_rate_limit_waits: None,
            strategy: BackoffStrategy::Fixed,
            max_interval: Duration::from_secs(defaults.max_interval_secs),
            randomization_factor: defaults.randomization_factor,
            multiplier: defaults.multiplier,
        }
    }

    /// Policy for listing calls
    pub fn for_search(config: &Config) -> Self {
        let search = &config.search;
        Self {
            max_rate_limit_waits: search.max_rate_limit_waits,
            ..Self::fixed(
                Duration::from_secs(search.rate_limit_backoff_secs),
                Duration::from_secs(search.error_backoff_secs),
                search.max_retries,
            )
        }
        .with_backoff(&config.backoff)
    }

    /// Policy for label mutation calls
    pub fn for_labeling(config: &Config) -> Self {
        let labeling = &config.labeling;
        let backoff = Duration::from_secs(labeling.rate_limit_backoff_secs);
        Self::fixed(backoff, backoff, labeling.max_retries).with_backoff(&config.backoff)
    }

    pub fn with_backoff(mut self, backoff: &BackoffConfig) -> Self {
        self.strategy = backoff.strategy;
        self.max_interval = Duration::from_secs(backoff.max_interval_secs);
        self.randomization_factor = backoff.randomization_factor;
        self.multiplier = backoff.multiplier;
        self
    }

    pub fn with_max_rate_limit_waits(mut self, max: Option<u32>) -> Self {
        self.max_rate_limit_waits = max;
        self
    }

    /// Delay sequence starting at `initial`
    fn schedule(&self, initial: Duration) -> Box<dyn Backoff + Send> {
        match self.strategy {
            BackoffStrategy::Fixed => Box::new(Constant::new(initial)),
            BackoffStrategy::Exponential => Box::new(
                ExponentialBackoffBuilder::new()
                    .with_initial_interval(initial)
                    .with_multiplier(self.multiplier)
                    .with_randomization_factor(self.randomization_factor)
                    .with_max_interval(self.max_interval.max(initial))
                    .with_max_elapsed_time(None)
                    .build(),
            ),
        }
    }
}

/// Executes remote calls under a [`RetryPolicy`]
#[derive(Debug, Clone)]
pub struct Retrier {
    policy: RetryPolicy,
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails permanently, or exhausts the policy.
    ///
    /// `operation` is re-invoked for every attempt and must re-issue the same request.
    pub async fn execute<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut rate_limit_delays = self.policy.schedule(self.policy.rate_limit_backoff);
        let mut error_delays = self.policy.schedule(self.policy.error_backoff);
        let mut attempts: u32 = 0;
        let mut failures: u32 = 0;
        let mut rate_limit_waits: u32 = 0;

        loop {
            attempts += 1;
            debug!("{}: attempt {}", operation_name, attempts);

            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if error.is_rate_limit() {
                rate_limit_waits += 1;
                if let Some(max) = self.policy.max_rate_limit_waits {
                    if rate_limit_waits > max {
                        return Err(LabelerError::RetriesExhausted {
                            operation: operation_name.to_string(),
                            attempts,
                            last: Box::new(error),
                        });
                    }
                }

                let delay = rate_limit_delays
                    .next_backoff()
                    .unwrap_or(self.policy.rate_limit_backoff);
                warn!(
                    "{}: {}, waiting {:?} before retrying the same request",
                    operation_name, error, delay
                );
                pause(delay).await;
                continue;
            }

            if !error.is_transient() {
                return Err(error);
            }

            failures += 1;
            if failures > self.policy.max_retries {
                if self.policy.max_retries == 0 {
                    return Err(error);
                }
                return Err(LabelerError::RetriesExhausted {
                    operation: operation_name.to_string(),
                    attempts,
                    last: Box::new(error),
                });
            }

            let delay = error_delays.next_backoff().unwrap_or(self.policy.error_backoff);
            warn!(
                "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                operation_name,
                failures,
                self.policy.max_retries + 1,
                error,
                delay
            );
            pause(delay).await;
        }
    }
}
