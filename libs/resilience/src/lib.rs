//! Retry helper shared by the ingress reclaimer and the restart RPC client.
//!
//! Both callers want the same shape of policy: a small, fixed number of
//! attempts, fixed exponential backoff, and a little jitter so that a pool of
//! callers retrying the same failing dependency doesn't retry in lockstep.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Number of attempts after the first, i.e. total attempts = max_attempts + 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff_multiplier: f64,
    /// Upper bound (exclusive) on the jitter added to each delay.
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("operation failed after exhausting retries: {0}")]
    Exhausted(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted(e) => e,
        }
    }
}

/// Runs `f` until it succeeds or `config.max_attempts` retries are used up,
/// sleeping `base_delay * multiplier^attempt + jitter` between attempts.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut f: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.base_delay;
    let mut attempt = 0u32;

    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= config.max_attempts {
                    return Err(RetryError::Exhausted(e));
                }
                warn!(attempt, error = %e, "retrying after failure");
                tokio::time::sleep(jittered(delay, config.jitter)).await;
                delay = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
                attempt += 1;
            }
        }
    }
}

fn jittered(base: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return base;
    }
    let extra = rand::thread_rng().gen_range(0..=jitter.as_millis() as u64);
    base + Duration::from_millis(extra)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let result: Result<_, RetryError<&str>> = with_retry(&RetryConfig::default(), || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        let config = RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            backoff_multiplier: 1.0,
            jitter: Duration::from_millis(1),
        };
        let result: Result<i32, RetryError<&str>> = with_retry(&config, || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>("boom")
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }
}
