use std::future::Future;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::ReconnectConfig;
use crate::source::SourceError;

/// Run a background task until it returns `Ok` or `shutdown` fires.
///
/// Each failure is logged and retried after a backoff that doubles from
/// `min_backoff` up to `max_backoff`. A run that stayed up for longer than
/// `max_backoff` resets the backoff, so a long-lived listener that drops once
/// reconnects quickly. The published snapshot is untouched meanwhile.
pub async fn supervise<F, Fut>(
    name: String,
    reconnect: ReconnectConfig,
    mut shutdown: watch::Receiver<()>,
    mut task: F,
) where
    F: FnMut(watch::Receiver<()>) -> Fut,
    Fut: Future<Output = Result<(), SourceError>>,
{
    let mut backoff = reconnect.min_backoff;

    loop {
        let started = Instant::now();
        let error = match task(shutdown.clone()).await {
            Ok(()) => {
                tracing::info!(task = %name, "background task stopped");
                return;
            }
            Err(e) => e,
        };

        if started.elapsed() > reconnect.max_backoff {
            backoff = reconnect.min_backoff;
        }
        tracing::warn!(
            task = %name,
            error = %error,
            retry_in_ms = backoff.as_millis() as u64,
            "background task failed, retrying"
        );

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = shutdown.changed() => {
                tracing::info!(task = %name, "background task stopped during backoff");
                return;
            }
        }
        backoff = backoff.saturating_mul(2).min(reconnect.max_backoff);
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn reconnect() -> ReconnectConfig {
        ReconnectConfig {
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
        }
    }

    fn lost() -> SourceError {
        SourceError::WatchLost(PathBuf::from("users.json"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_doubling_backoff() {
        let (_tx, rx) = watch::channel(());
        let attempts = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();

        let counter = attempts.clone();
        supervise("test".to_string(), reconnect(), rx, move |_| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(lost())
                } else {
                    Ok(())
                }
            }
        })
        .await;

        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        // 1s + 2s + 4s of backoff
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(7), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(8), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_is_capped() {
        let (_tx, rx) = watch::channel(());
        let attempts = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();

        let counter = attempts.clone();
        supervise("test".to_string(), reconnect(), rx, move |_| {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 6 {
                    Err(lost())
                } else {
                    Ok(())
                }
            }
        })
        .await;

        // 1 + 2 + 4 + 8 + 8 + 8
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(31), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(32), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff() {
        let (tx, rx) = watch::channel(());
        let handle = tokio::spawn(supervise("test".to_string(), reconnect(), rx, |_| async {
            Err::<(), _>(lost())
        }));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("supervisor should stop on shutdown")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_receives_shutdown() {
        let (tx, rx) = watch::channel(());
        let handle = tokio::spawn(supervise(
            "test".to_string(),
            reconnect(),
            rx,
            |mut shutdown| async move {
                let _ = shutdown.changed().await;
                Ok::<(), SourceError>(())
            },
        ));

        tokio::task::yield_now().await;
        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
