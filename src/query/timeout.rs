//! Timeout wrapper for store round-trips

use super::error::QueryError;
use super::models::QueryOperation;
use anyhow::Result;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Race `future` against a `timeout_ms` timer.
///
/// Whichever side loses is dropped before this returns: the timer never
/// outlives the call, and an abandoned store future is cancelled rather than
/// left running in the background.
pub async fn with_timeout<T, F>(operation: QueryOperation, timeout_ms: u64, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms), future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("{} timed out after {}ms", operation, timeout_ms);
            Err(QueryError::Timeout {
                operation,
                timeout_ms,
            }
            .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_fast_future_wins() {
        let value = with_timeout(QueryOperation::Path, 1_000, async { anyhow::Ok(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_inner_error_is_returned_untouched() {
        let err = with_timeout::<(), _>(QueryOperation::Path, 1_000, async {
            anyhow::bail!("connection refused")
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "connection refused");
    }

    #[tokio::test]
    async fn test_hanging_future_times_out_and_is_dropped() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());

        let started = Instant::now();
        let err = with_timeout::<(), _>(QueryOperation::Dependencies, 50, async move {
            let _flag = flag;
            std::future::pending::<()>().await;
            anyhow::Ok(())
        })
        .await
        .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(dropped.load(Ordering::SeqCst));
        let typed = err.downcast::<QueryError>().unwrap();
        assert!(matches!(
            typed,
            QueryError::Timeout {
                operation: QueryOperation::Dependencies,
                timeout_ms: 50
            }
        ));
    }
}
