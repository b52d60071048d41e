use crate::engine::error::Result;
use log::warn;
use std::thread;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries
    pub max_retries: u32,
    /// Delay between retries in milliseconds
    pub retry_delay_ms: u64,
    /// Whether to use exponential backoff
    pub use_backoff: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 100,
            use_backoff: true,
        }
    }
}

impl RetryConfig {
    /// Fixed-interval polling, used while waiting for a router to be registered
    pub fn polling(max_retries: u32, interval_ms: u64) -> Self {
        Self {
            max_retries,
            retry_delay_ms: interval_ms,
            use_backoff: false,
        }
    }

    /// Calculate delay for a given retry attempt
    pub fn calculate_delay(&self, retry_count: u32) -> Duration {
        let delay = if self.use_backoff {
            self.retry_delay_ms * 2_u64.saturating_pow(retry_count.min(16))
        } else {
            self.retry_delay_ms
        };
        Duration::from_millis(delay)
    }

    /// Sleep for the appropriate delay
    pub fn sleep(&self, retry_count: u32) {
        thread::sleep(self.calculate_delay(retry_count));
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.retryable() && attempt < self.max_retries => {
                    warn!(
                        "{} failed (attempt {}/{}), retrying: {}",
                        what,
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    self.sleep(attempt);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
