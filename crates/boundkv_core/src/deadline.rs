//! Racing an operation against a deadline.
//!
//! [`race_with_deadline`] always settles within its budget. When the timer
//! wins, the operation's future is dropped: the caller stops waiting, but
//! any work the engine already accepted keeps running. A write whose
//! confirmation times out may still take effect later, and callers must
//! tolerate that.

use crate::error::{CoreError, CoreResult};
use std::future::Future;
use std::time::Duration;

/// Runs `operation` until it settles or `timeout` elapses, whichever is first.
///
/// - settles with a value first: the value is returned
/// - settles with an error first: the error propagates unchanged
/// - timer fires first: [`CoreError::Timeout`] carrying `label`
///
/// # Example
///
/// ```rust,ignore
/// use boundkv_core::{race_with_deadline, DEFAULT_TIMEOUT};
///
/// let value = race_with_deadline(async { Ok(42) }, "answering", DEFAULT_TIMEOUT).await?;
/// ```
pub async fn race_with_deadline<T, F>(operation: F, label: &str, timeout: Duration) -> CoreResult<T>
where
    F: Future<Output = CoreResult<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(outcome) => outcome,
        Err(_elapsed) => {
            tracing::warn!(
                label,
                timeout_ms = timeout.as_millis() as u64,
                "deadline exceeded"
            );
            Err(CoreError::timeout(label))
        }
    }
}
