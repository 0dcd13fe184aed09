use crate::services::upload_service::UploadService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};

/// Runs the expiry sweep on a fixed interval until shutdown is signalled.
pub struct BackgroundWorker {
    uploads: Arc<UploadService>,
    period: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(uploads: Arc<UploadService>, shutdown: watch::Receiver<bool>) -> Self {
        let period = uploads.config().sweep_interval().max(Duration::from_secs(1));
        Self {
            uploads,
            period,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Upload sweeper started (every {:?})", self.period);

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Upload sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }
    }

    async fn sweep_once(&self) {
        tracing::info!("🧹 Sweeping idle upload sessions...");
        match self.uploads.expiry_sweep().await {
            Ok(report) => tracing::info!(
                aborted = report.aborted,
                purged = report.purged,
                failed = report.failed,
                "✅ Upload sweep completed"
            ),
            Err(e) => tracing::error!("❌ Upload sweep failed: {}", e),
        }
    }
}
