use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::OrderError;

/// Backoff policy for gateway calls: up to `max_attempts` tries for
/// transient failures, all bounded by the per-order `deadline`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub deadline: Duration,
}

impl RetryPolicy {
    /// The standard policy for a market order (5 s deadline by default).
    pub fn market(deadline_secs: u64) -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            deadline: Duration::from_secs(deadline_secs),
        }
    }
}

/// Runs a gateway call under the retry policy.
///
/// Transient errors back off exponentially and retry; anything else is
/// returned as-is. When the transient failures outlive the attempt budget
/// the result is `Exhausted`; when the deadline elapses first, `Timeout`.
/// Either way the signal is abandoned and no partial state remains.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, OrderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, OrderError>>,
{
    let attempt_loop = async {
        let mut backoff = policy.initial_backoff;
        let mut last_error: Option<OrderError> = None;
        for attempt in 1..=policy.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    warn!(attempt, error = %e, "transient gateway error, backing off");
                    last_error = Some(e);
                    if attempt < policy.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(OrderError::Exhausted(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".into()),
        ))
    };

    match tokio::time::timeout(policy.deadline, attempt_loop).await {
        Ok(result) => result,
        Err(_) => Err(OrderError::Timeout(policy.deadline)),
    }
}
