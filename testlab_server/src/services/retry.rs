//! One immediate retry around a remote call.

use std::future::Future;

use crate::error::TestlabError;
use crate::remote::RemoteError;

/// Run `call`, retrying once without delay on failure.
///
/// A second failure becomes [`TestlabError::UpstreamUnavailable`].
pub async fn with_single_retry<T, F, Fut>(operation: &'static str, call: F) -> Result<T, TestlabError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let first = match call().await {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    tracing::warn!(operation, error = %first, "Remote call failed, retrying once");
    crate::metrics::remote_retry(operation);

    call().await.map_err(|e| {
        tracing::error!(operation, error = %e, "Remote call failed after retry");
        TestlabError::UpstreamUnavailable {
            operation,
            detail: e.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn first_success_makes_one_call() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = with_single_retry("probe", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, RemoteError>(7)
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_attempt_can_recover() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result = with_single_retry("probe", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(RemoteError::Transport("reset".into()))
            } else {
                Ok("ok")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn two_failures_are_upstream_unavailable() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let result: Result<(), _> = with_single_retry("probe", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Status {
                status: 500,
                body: "boom".into(),
            })
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(
            err,
            TestlabError::UpstreamUnavailable { operation: "probe", .. }
        ));
        assert!(err.is_retryable());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
