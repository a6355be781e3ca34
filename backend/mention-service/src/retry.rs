/// Bounded retry with exponential backoff and jitter for mention writes
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one; 0 disables retry
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for a single delay
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// Add random jitter to backoff (±30%)
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retry
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_retries(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            ..Self::default()
        }
    }

    /// Run `op` until it succeeds, fails with an error `is_retryable` rejects, or
    /// the retry budget is spent. The last error is returned as-is.
    pub async fn run<F, Fut, T, E, P>(&self, mut op: F, is_retryable: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
        P: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt >= self.max_retries || !is_retryable(&e) {
                        return Err(e);
                    }
                    attempt += 1;

                    let delay = calculate_backoff(backoff, self.jitter);
                    warn!(
                        error = %e,
                        "Retry attempt {}/{}, waiting {:?}",
                        attempt, self.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;

                    backoff = Duration::from_millis(
                        ((backoff.as_millis() as f64 * self.backoff_multiplier)
                            .min(self.max_backoff.as_millis() as f64)) as u64,
                    );
                }
            }
        }
    }
}

fn calculate_backoff(base: Duration, jitter: bool) -> Duration {
    if jitter {
        let jitter_factor: f64 = 1.0 + rand::thread_rng().gen_range(-0.3..0.3);
        Duration::from_millis((base.as_millis() as f64 * jitter_factor) as u64)
    } else {
        base
    }
}
