use crate::traits::{Spammer, SpammerStats};
use anyhow::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn, Instrument};

pub struct WorkerRunner;

impl WorkerRunner {
    /// Runs a spammer until it stops on its own or Ctrl+C is pressed.
    ///
    /// Ctrl+C is turned into a cooperative [`Spammer::request_stop`]: the
    /// in-flight ledger call finishes and the loop exits at its next checkpoint.
    pub async fn run_until_interrupted(spammer: Arc<dyn Spammer>) -> Result<SpammerStats> {
        Self::run_until(spammer, async {
            if let Err(err) = signal::ctrl_c().await {
                error!("Unable to listen for shutdown signal: {}", err);
                // never resolve, so the spammer is not stopped by a broken listener
                std::future::pending::<()>().await;
            }
            info!("🛑 Received Ctrl+C. Finishing current operation...");
        })
        .await
    }

    /// Same as [`Self::run_until_interrupted`] with an arbitrary shutdown trigger.
    pub async fn run_until<S>(spammer: Arc<dyn Spammer>, shutdown: S) -> Result<SpammerStats>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let stopper = spammer.clone();
        let listener = tokio::spawn(async move {
            shutdown.await;
            stopper.request_stop();
        });

        let start_time = std::time::Instant::now();
        let span = tracing::info_span!("spammer", name = spammer.name());
        let result = spammer.start().instrument(span).await;
        listener.abort();

        let stats = match result {
            Ok(Some(stats)) => stats,
            Ok(None) => {
                warn!("{} is already running", spammer.name());
                SpammerStats::default()
            }
            Err(e) => {
                error!("{} failed: {:?}", spammer.name(), e);
                return Err(e);
            }
        };

        let total_duration = start_time.elapsed();
        let total = stats.success + stats.failed;
        let rate = if total > 0 {
            (stats.success as f64 / total as f64) * 100.0
        } else {
            0.0
        };

        info!("🛑 Shutdown Complete.");
        info!(
            "Total Time: {:.1}s | Total Success: {} | Total Fail: {} | Success Rate: {:.2}%",
            total_duration.as_secs_f64(),
            stats.success,
            stats.failed,
            rate
        );

        Ok(stats)
    }
}
