//! Retry with linear backoff for flaky OS operations.
//!
//! Disk image creation, attach, detach and conversion fail intermittently on
//! CI hosts (busy devices, Spotlight indexing, stale mounts). Each of them is
//! wrapped in [`retry`] with the same [`RetryPolicy`].

use crate::bundler::error::Error;
use std::future::Future;
use tokio::time::Duration;

/// Upper bound accepted from the environment for the attempt count.
const MAX_ATTEMPTS: u32 = 50;

/// Upper bound accepted from the environment for the base delay.
const MAX_BASE_DELAY_MS: u64 = 60_000;

/// How many times to try and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay unit; the wait after failed attempt `n` is `base_delay × n`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(2000),
        }
    }
}

impl RetryPolicy {
    /// Policy with explicit values.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Read `DMG_RETRY_ATTEMPTS` and `DMG_RETRY_DELAY_MS`, clamped, falling
    /// back to the defaults when unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let attempts = parse_env("DMG_RETRY_ATTEMPTS", u64::from(defaults.max_attempts), u64::from(MAX_ATTEMPTS));
        let delay_ms = parse_env(
            "DMG_RETRY_DELAY_MS",
            defaults.base_delay.as_millis() as u64,
            MAX_BASE_DELAY_MS,
        );
        Self::new(attempts as u32, Duration::from_millis(delay_ms))
    }

    /// Wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

fn parse_env(var_name: &str, default: u64, max: u64) -> u64 {
    std::env::var(var_name)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(|v| v.min(max))
        .unwrap_or(default)
}

/// Why [`retry`] gave up.
#[derive(Debug)]
pub enum RetryError {
    /// The operation failed with an error the classifier refused to retry.
    Fatal(Error),
    /// Every attempt failed.
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the final attempt
        last: Error,
    },
}

impl RetryError {
    /// Collapse into a bundler error, mapping exhaustion with `on_exhausted`.
    pub fn into_error<F>(self, on_exhausted: F) -> Error
    where
        F: FnOnce(u32, Error) -> Error,
    {
        match self {
            RetryError::Fatal(error) => error,
            RetryError::Exhausted { attempts, last } => on_exhausted(attempts, last),
        }
    }
}

/// Classifier that retries everything.
pub fn always(_: &Error) -> bool {
    true
}

/// Run `operation` until it succeeds, `is_retryable` rejects an error, or
/// `policy.max_attempts` is reached.
///
/// Each retryable failure is logged and followed by a sleep of
/// `policy.delay_for(attempt)`; there is no sleep after the final attempt.
pub async fn retry<T, F, Fut, P>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: P,
    mut operation: F,
) -> std::result::Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = crate::bundler::Result<T>>,
    P: Fn(&Error) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    log::info!("✓ {} succeeded on attempt {}", operation_name, attempt);
                }
                return Ok(value);
            }
            Err(error) if !is_retryable(&error) => {
                log::error!("{} failed with unrecoverable error: {}", operation_name, error);
                return Err(RetryError::Fatal(error));
            }
            Err(error) => {
                log::warn!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name,
                    attempt,
                    max_attempts,
                    error
                );

                if attempt >= max_attempts {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }

                let wait = policy.delay_for(attempt);
                log::info!("Retrying {} in {:.1}s...", operation_name, wait.as_secs_f64());
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_linearly() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(9), Duration::from_millis(18000));
    }

    #[test]
    fn test_new_requires_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn test_parse_env_defaults_when_unset() {
        assert_eq!(parse_env("DMG_RETRY_TEST_UNSET_7C1E", 10, 50), 10);
    }
}
