//! Deadlines for store-bound operations.
//!
//! Every async operation in this crate publishes its results in one step at
//! the very end, so dropping its future early leaves no partial state behind.
//! [`with_timeout`] turns that into an error the caller can match on.

use std::{future::Future, time::Duration};

use crate::{Error, Result};

/// Runs `fut`, failing with [`Error::Cancelled`] if it does not finish within `timeout`.
///
/// ```
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// use std::time::Duration;
///
/// let err = layerconf::with_timeout(Duration::from_millis(5), async {
///     tokio::time::sleep(Duration::from_secs(60)).await;
///     Ok(())
/// })
/// .await
/// .unwrap_err();
/// assert!(err.is_cancelled());
/// # });
/// ```
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(?timeout, "Operation cancelled by deadline");
            Err(Error::Cancelled { timeout })
        }
    }
}
