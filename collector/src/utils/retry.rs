use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Capped exponential backoff. `max_retries = 0` means a single attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            ..Default::default()
        }
    }

    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Delay before retry number `retry` (0-based), with up to 50% jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(retry));
        let capped = exp.min(self.max_delay_ms);
        let jitter = rand::rng().random_range(0..=capped / 2);
        Duration::from_millis(capped.saturating_add(jitter).min(self.max_delay_ms))
    }
}

#[derive(Debug)]
pub struct Retried<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    should_retry: P,
    operation: F,
) -> Retried<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let mut attempts = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => {
                return Retried {
                    result: Ok(value),
                    attempts,
                };
            }
            Err(e) => {
                let retries_used = attempts - 1;
                if retries_used >= policy.max_retries || !should_retry(&e) {
                    return Retried {
                        result: Err(e),
                        attempts,
                    };
                }

                tokio::time::sleep(policy.delay_for(retries_used)).await;
            }
        }
    }
}
