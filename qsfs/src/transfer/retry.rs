//! Retry strategy for part failures (spec §4.H "Retry" / §5 "Timeouts").

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::errors::ClientError;

/// Max-retries-with-scaled-delay strategy. Only errors the taxonomy marks
/// retryable (spec §7) are retried; the sleep between attempts is woken
/// early by [`notify_shutdown`](Self::notify_shutdown) so a cancelled
/// transfer doesn't keep a worker thread parked.
pub struct RetryStrategy {
    max_retries: u32,
    base_delay: Duration,
    sleep_gate: Mutex<bool>,
    sleep_condvar: Condvar,
}

impl RetryStrategy {
    pub fn new(max_retries: u32) -> Self {
        RetryStrategy {
            max_retries,
            base_delay: Duration::from_millis(200),
            sleep_gate: Mutex::new(false),
            sleep_condvar: Condvar::new(),
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn should_retry(&self, attempt: u32, error: &ClientError) -> bool {
        error.retryable && attempt < self.max_retries
    }

    /// Exponential-ish backoff: `base_delay * 2^attempt`, capped at 30s.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.saturating_mul(1u32 << attempt.min(8));
        scaled.min(Duration::from_secs(30))
    }

    /// Sleeps for `delay_for(attempt)`, waking early if
    /// [`notify_shutdown`](Self::notify_shutdown) is called.
    pub fn retry_request_sleep(&self, attempt: u32) {
        let delay = self.delay_for(attempt);
        let gate = self.sleep_gate.lock().unwrap();
        let _ = self.sleep_condvar.wait_timeout(gate, delay).unwrap();
    }

    pub fn notify_shutdown(&self) {
        *self.sleep_gate.lock().unwrap() = true;
        self.sleep_condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn only_retryable_kinds_are_retried_within_budget() {
        let strategy = RetryStrategy::new(3);
        let retryable = ClientError::network("timeout");
        let terminal = ClientError::new(ErrorKind::AccessDenied, "AccessDenied", "nope");

        assert!(strategy.should_retry(0, &retryable));
        assert!(strategy.should_retry(2, &retryable));
        assert!(!strategy.should_retry(3, &retryable));
        assert!(!strategy.should_retry(0, &terminal));
    }

    #[test]
    fn delay_grows_and_caps() {
        let strategy = RetryStrategy::new(10);
        assert!(strategy.delay_for(0) < strategy.delay_for(4));
        assert_eq!(strategy.delay_for(20), Duration::from_secs(30));
    }
}
