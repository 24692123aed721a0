use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ChatResult;

/// Exponential backoff for idempotent reads. Writes are never retried here:
/// the caller has to learn whether a send went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRetry {
    /// Total tries, including the first one.
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReadRetry {
    fn default() -> Self {
        Self {
            attempts: 4,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl ReadRetry {
    pub fn none() -> Self {
        Self {
            attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> ChatResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ChatResult<T>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && retry + 1 < self.attempts => {
                    let delay = self.delay_for(retry);
                    warn!("{} failed ({}), retrying in {:?}", what, e, delay);
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChatError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(attempts: u32) -> ReadRetry {
        ReadRetry {
            attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn delay_doubles_up_to_cap() {
        let policy = ReadRetry::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(10), Duration::from_secs(2));
        assert_eq!(policy.delay_for(40), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn retries_backend_errors_until_success() {
        let calls = AtomicU32::new(0);
        let value = fast(3)
            .run("flaky read", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ChatError::BackendUnavailable(anyhow::anyhow!("timeout")))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let result: ChatResult<()> = fast(2)
            .run("dead read", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ChatError::BackendUnavailable(anyhow::anyhow!("down")))
            })
            .await;
        assert!(matches!(result, Err(ChatError::BackendUnavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn validation_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: ChatResult<()> = fast(5)
            .run("bad read", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ChatError::NotFound("chat".into()))
            })
            .await;
        assert!(matches!(result, Err(ChatError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
