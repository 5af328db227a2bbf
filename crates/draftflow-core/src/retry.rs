//! Bounded exponential backoff for external service calls.

use std::time::Duration;

use tracing::warn;

use draftflow_types::config::RetryPolicy;
use draftflow_types::error::{EngineError, GeneratorError};

/// Run `op` until it succeeds, fails non-transiently, or exhausts the
/// policy's attempt budget.
///
/// Exhaustion surfaces as a transient-service error for the phase; the
/// engine promotes that to a terminal failure when it records it.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    phase: &str,
    mut op: F,
) -> Result<T, EngineError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, GeneratorError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = backoff_delay(policy, attempt);
                warn!(
                    phase,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) if err.is_transient() => {
                return Err(EngineError::TransientService {
                    phase: phase.to_string(),
                    detail: format!("{err} (after {attempt} attempts)"),
                });
            }
            Err(err) => {
                return Err(EngineError::SchemaValidation {
                    phase: phase.to_string(),
                    detail: err.to_string(),
                });
            }
        }
    }
}

fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let ms = policy
        .base_delay_ms
        .saturating_mul(1u64 << exp)
        .min(policy.max_delay_ms);
    Duration::from_millis(ms)
}
