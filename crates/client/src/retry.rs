use std::time::Duration;

use tracing::{debug, warn};

use super::error::SourceResult;
use super::source::{Batch, BatchRequest, MessageSource};

/// Backoff policy for transient retrieval failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub cap_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            cap_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, cap_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            cap_delay,
        }
    }

    /// Delay before retrying after failed attempt `attempt` (1-based):
    /// `base * 2^(attempt - 1)`, capped at `cap_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let multiplier = 1u64 << exponent;
        let base_ms = self.base_delay.as_millis().min(u128::from(u64::MAX)) as u64;
        let cap_ms = self.cap_delay.as_millis().min(u128::from(u64::MAX)) as u64;
        Duration::from_millis(base_ms.saturating_mul(multiplier).min(cap_ms))
    }
}

/// Notification for one failed attempt that will be retried after `delay`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryNotice {
    pub attempt: u32,
    pub delay: Duration,
    pub error: String,
}

/// Fetches one batch, retrying transient failures with exponential backoff.
///
/// `on_retry` fires before each backoff sleep so callers can surface a
/// transient-retry indicator. Non-retryable errors return immediately
/// without consuming retry budget.
pub async fn fetch_with_retry<S, F>(
    source: &S,
    request: &BatchRequest,
    policy: &RetryPolicy,
    mut on_retry: F,
) -> SourceResult<Batch>
where
    S: MessageSource + ?Sized,
    F: FnMut(RetryNotice),
{
    let max_attempts = policy.max_retries.saturating_add(1);
    let mut attempt = 1u32;

    loop {
        match source.fetch_batch(request).await {
            Ok(batch) => {
                if attempt > 1 {
                    debug!(
                        conversation_id = %request.conversation_id,
                        direction = request.direction.as_str(),
                        attempt,
                        "batch retrieval succeeded after retry"
                    );
                }
                return Ok(batch);
            }
            Err(error) if error.is_retryable() && attempt < max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    conversation_id = %request.conversation_id,
                    direction = request.direction.as_str(),
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retryable batch failure, backing off"
                );
                on_retry(RetryNotice {
                    attempt,
                    delay,
                    error: error.to_string(),
                });
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(error) => {
                if attempt > 1 {
                    warn!(
                        conversation_id = %request.conversation_id,
                        direction = request.direction.as_str(),
                        attempts = attempt,
                        error = %error,
                        "batch retrieval failed after all retries"
                    );
                }
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::SourceError;
    use crate::ids::ConversationId;
    use crate::source::{BatchDirection, BoxFuture};

    /// Source double that fails a planned number of times before succeeding.
    struct FlakySource {
        failures_remaining: Mutex<u32>,
        calls: Mutex<u32>,
        retryable: bool,
    }

    impl FlakySource {
        fn new(failures: u32, retryable: bool) -> Self {
            Self {
                failures_remaining: Mutex::new(failures),
                calls: Mutex::new(0),
                retryable,
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().expect("calls lock poisoned")
        }
    }

    impl MessageSource for FlakySource {
        fn fetch_batch<'a>(
            &'a self,
            _request: &'a BatchRequest,
        ) -> BoxFuture<'a, SourceResult<Batch>> {
            Box::pin(async move {
                *self.calls.lock().expect("calls lock poisoned") += 1;
                let mut remaining = self
                    .failures_remaining
                    .lock()
                    .expect("failures lock poisoned");

                if *remaining == 0 {
                    return Ok(Batch {
                        messages: Vec::new(),
                        has_more: false,
                        next_cursor: None,
                        total_estimate: None,
                    });
                }

                *remaining -= 1;
                if self.retryable {
                    Err(SourceError::Network {
                        stage: "flaky-source",
                        details: "connection reset".to_string(),
                    })
                } else {
                    Err(SourceError::ClientRequest {
                        stage: "flaky-source",
                        status: 400,
                        body: "bad cursor".to_string(),
                    })
                }
            })
        }
    }

    fn request_fixture() -> BatchRequest {
        BatchRequest::new(ConversationId::generate(), BatchDirection::Before, 30)
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(100))
    }

    #[test]
    fn backoff_is_monotone_and_capped() {
        let policy = RetryPolicy::new(6, Duration::from_millis(100), Duration::from_millis(1_500));

        let delays: Vec<_> = (1..=7).map(|n| policy.delay_for_attempt(n)).collect();
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert_eq!(delays[2], Duration::from_millis(400));
        assert_eq!(delays[6], Duration::from_millis(1_500));
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(policy.delay_for_attempt(64), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_to_success() {
        let source = FlakySource::new(2, true);
        let mut notices = Vec::new();

        let result = fetch_with_retry(&source, &request_fixture(), &fast_policy(), |notice| {
            notices.push(notice);
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(source.calls(), 3);
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].attempt, 1);
        assert_eq!(notices[1].attempt, 2);
        assert!(notices[0].delay <= notices[1].delay);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_budget_exhaustion_surfaces_the_last_error() {
        let source = FlakySource::new(10, true);
        let mut retry_count = 0u32;

        let result = fetch_with_retry(&source, &request_fixture(), &fast_policy(), |_| {
            retry_count += 1;
        })
        .await;

        assert!(matches!(result, Err(SourceError::Network { .. })));
        // max_retries = 3 means 4 total attempts and 3 backoff sleeps.
        assert_eq!(source.calls(), 4);
        assert_eq!(retry_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_fail_immediately() {
        let source = FlakySource::new(10, false);
        let mut retry_count = 0u32;

        let result = fetch_with_retry(&source, &request_fixture(), &fast_policy(), |_| {
            retry_count += 1;
        })
        .await;

        assert!(matches!(result, Err(SourceError::ClientRequest { .. })));
        assert_eq!(source.calls(), 1);
        assert_eq!(retry_count, 0);
    }
}
