//! Timeout helpers
//!
//! Wrap async operations in `tokio::time::timeout` and map expiry onto
//! `ScoutError::Timeout`. The gateway uses these per backend attempt; git
//! subprocesses use them per command.
//!
//! ## Usage
//!
//! ```ignore
//! let response = with_timeout(
//!     Duration::from_secs(120),
//!     backend.chat(&request),
//!     "gpt-4o completion",
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use crate::types::{Result, ScoutError};

/// Execute an async operation with a timeout
///
/// Returns a timeout error if the operation doesn't complete within the specified duration.
pub async fn with_timeout<T, F>(timeout: Duration, future: F, operation_name: &str) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(ScoutError::timeout(operation_name, timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_success() {
        let result = with_timeout(
            Duration::from_secs(1),
            async { Ok::<_, ScoutError>(42) },
            "test operation",
        )
        .await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_with_timeout_expires() {
        let result = with_timeout(
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                Ok::<_, ScoutError>(42)
            },
            "slow operation",
        )
        .await;
        let err = result.unwrap_err();
        assert!(matches!(err, ScoutError::Timeout { .. }));
        assert!(err.to_string().contains("slow operation"));
    }
}
