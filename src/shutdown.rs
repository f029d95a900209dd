use std::future::Future;

use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};

/// Wait for a shutdown signal (SIGINT or SIGTERM).
pub async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, cancelling run...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, cancelling run...");
        }
    }
}

/// Cancel `token` once a shutdown signal arrives.
pub fn cancel_on_shutdown(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        token.cancel();
    });
}

/// Run `fut` unless `cancel` fires first, in which case the future is dropped.
pub async fn until_cancelled<T, F>(cancel: &CancellationToken, step: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled(format!("{step} interrupted"))),
        result = fut => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_until_cancelled_passes_result_through() {
        let token = CancellationToken::new();
        let value = until_cancelled(&token, "step", async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_until_cancelled_interrupts_pending_future() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let result: Result<()> = until_cancelled(&token, "Polling", async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        })
        .await;

        match result {
            Err(AppError::Cancelled(msg)) => assert_eq!(msg, "Polling interrupted"),
            other => panic!("expected cancellation, got {other:?}"),
        }
    }
}
