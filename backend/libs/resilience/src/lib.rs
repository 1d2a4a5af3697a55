/// Resilience helpers for calls that leave the process
///
/// Every call to an external collaborator (object storage, search index)
/// must be bounded in time. This crate keeps that policy in one place so
/// adapters only decide *how long* they are willing to wait.
///
/// No retries live here: a timed out write is surfaced to the caller, which
/// owns the retry decision.
///
/// # Example
///
/// ```rust,no_run
/// use resilience::timeout::{with_timeout_result, TimeoutError};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let result = with_timeout_result(Duration::from_secs(5), async {
///         Ok::<_, std::io::Error>(42)
///     })
///     .await;
///
///     match result {
///         Ok(value) => println!("{value}"),
///         Err(TimeoutError::Elapsed(after)) => println!("gave up after {after:?}"),
///         Err(TimeoutError::Failed(err)) => println!("failed: {err}"),
///     }
/// }
/// ```

pub mod timeout;

pub use timeout::{with_timeout_result, TimeoutError};
