/// Deadline wrapper for async operations
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Outcome of a bounded call that did not produce a value.
///
/// The operation's own error is kept typed so callers can still map it to
/// their domain taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    /// The deadline passed before the operation finished.
    #[error("operation timed out after {0:?}")]
    Elapsed(Duration),
    /// The operation finished in time but failed.
    #[error("operation failed: {0}")]
    Failed(#[source] E),
}

impl<E> TimeoutError<E> {
    pub fn is_elapsed(&self) -> bool {
        matches!(self, TimeoutError::Elapsed(_))
    }
}

/// Execute a fallible future with a deadline, keeping its error typed
pub async fn with_timeout_result<F, T, E>(
    duration: Duration,
    future: F,
) -> Result<T, TimeoutError<E>>
where
    F: Future<Output = Result<T, E>>,
{
    match timeout(duration, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TimeoutError::Failed(err)),
        Err(_) => {
            tracing::debug!(?duration, "operation deadline elapsed");
            Err(TimeoutError::Elapsed(duration))
        }
    }
}
