use std::future::Future;

use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use crate::models::retry::RetryConfig;

/// Runs `operation` until it succeeds or `config.max_attempts` is reached,
/// sleeping with jittered exponential backoff in between.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    info!(operation = operation_name, attempt, max_attempts, "Retry succeeded");
                }
                return Ok(result);
            }
            Err(e) => {
                if attempt >= max_attempts {
                    warn!(
                        operation = operation_name,
                        max_attempts,
                        error = %e,
                        "Retry failed after exhausting all attempts"
                    );
                    return Err(e);
                }

                debug!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms,
                    error = %e,
                    "Attempt failed, backing off"
                );

                let jitter = rand::random_range(-0.1..=0.1);
                let jittered_delay = (delay_ms as f64 * (1.0 + jitter)) as u64;

                sleep(Duration::from_millis(jittered_delay)).await;

                delay_ms = delay_ms
                    .saturating_mul(config.backoff_multiplier)
                    .min(config.max_delay_ms);
            }
        }
    }
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to bind SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
