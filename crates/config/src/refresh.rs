//! Shared retry and refresh machinery for the dynamic loaders

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use hopper_protocol::StatsLogger;

use crate::{ConfigError, Result};

/// Fetch attempts per pull, both at construction and on refresh.
pub(crate) const PULL_ATTEMPTS: u32 = 5;

/// Timing for a dynamic loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Base interval between refreshes; each loader adds up to 100ms of
    /// jitter so a fleet does not stampede the config service
    pub reload_interval: Duration,

    /// Base delay between failed fetch attempts; grows linearly with the
    /// attempt number
    pub retry_delay: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            reload_interval: Duration::from_secs(300),
            retry_delay: Duration::from_secs(2),
        }
    }
}

/// Pull with up to [`PULL_ATTEMPTS`] tries, sleeping `delay * attempt`
/// after each failure.
pub(crate) async fn retry_pull<T, F, Fut>(retry_delay: Duration, pull: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;
    for attempt in 1..=PULL_ATTEMPTS {
        match pull().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "config pull failed");
                last_error = Some(e);
            }
        }
        tokio::time::sleep(retry_delay * attempt).await;
    }
    Err(last_error.unwrap_or_else(|| ConfigError::Fetch("no attempts made".to_string())))
}

/// Run the refresh loop until cancelled: tick, re-pull, publish via
/// `publish` on success, count `config.error` on failure.
pub(crate) async fn refresh_loop<T, F, Fut, P>(
    config: LoaderConfig,
    stats: Arc<dyn StatsLogger>,
    cancel: CancellationToken,
    pull: F,
    publish: P,
) where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(T),
{
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..100));
    let mut ticker = tokio::time::interval(config.reload_interval + jitter);
    // The first tick fires immediately; we already loaded at construction.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let t0 = std::time::Instant::now();
                match retry_pull(config.retry_delay, &pull).await {
                    Ok(snapshot) => {
                        stats.timing("config.success", t0.elapsed());
                        publish(snapshot);
                    }
                    Err(e) => {
                        stats.timing("config.error", t0.elapsed());
                        tracing::error!(error = %e, "failed to refresh config; keeping previous snapshot");
                    }
                }
            }
            _ = cancel.cancelled() => {
                tracing::info!("config refresh loop stopping");
                return;
            }
        }
    }
}
