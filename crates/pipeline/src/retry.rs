//! Retry loop for transient failures.
//!
//! Only errors whose kind is retryable (transient network) are tried
//! again; everything else returns immediately. Waits race the
//! cancellation token, as does the operation itself.

use std::future::Future;

use tokio_util::sync::CancellationToken;
use vidchain_core::retry::RetryPolicy;

use crate::error::GenerationError;

/// Run `op` until it succeeds, fails permanently, exhausts `policy`, or
/// `cancel` fires.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut op: F,
) -> Result<T, GenerationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let mut retry = 0u32;

    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            result = op() => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        retry += 1;
        let Some(delay) = policy.delay_for(retry) else {
            tracing::warn!(operation, attempts = retry, error = %err, "Retries exhausted");
            return Err(err);
        };

        tracing::warn!(
            operation,
            retry,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient failure, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
