//! Single-retry helper for select-list queries

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Delay before the select-list queries try again
pub const OPTIONS_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Run `op`, and if it fails run it once more after `delay`.
///
/// The second attempt's result is returned as is.
pub async fn retry_once<T, E, F, Fut>(delay: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!("Query failed, retrying in {:?}: {}", delay, e);
            tokio::time::sleep(delay).await;
            op().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_success_runs_once() {
        let calls = AtomicUsize::new(0);

        let result: Result<i32, String> = retry_once(Duration::from_millis(50), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        })
        .await;

        assert_eq!(assert_ok!(result), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_once_after_delay() {
        let calls = AtomicUsize::new(0);
        let started = Instant::now();

        let result: Result<&str, String> = retry_once(Duration::from_millis(30), || async {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err("connection reset".to_string()),
                _ => Ok("second"),
            }
        })
        .await;

        assert_eq!(assert_ok!(result), "second");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_gives_up_after_second_failure() {
        let calls = AtomicUsize::new(0);

        let result: Result<(), String> = retry_once(Duration::from_millis(1), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Err(format!("failure {}", n))
        })
        .await;

        assert_eq!(assert_err!(result), "failure 1");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
