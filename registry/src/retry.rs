use crate::{warn, AppError};
use core::future::Future;

/// Caller-side retry for operations that failed with a retryable (store) error.
/// Domain errors are returned at once. The registry itself never retries.
pub async fn retry_with_delay<F, Fut, T>(
    attempts: usize,
    delay: std::time::Duration,
    mut op: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut left = attempts.max(1);
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && left > 1 => {
                left -= 1;
                warn!("Retrying after {:?}, {} attempts left: {}", delay, left, e);
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
