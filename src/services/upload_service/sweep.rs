use super::{UploadError, UploadService};
use crate::models::SweepReport;
use crate::services::session_store::Lifecycle;
use chrono::{DateTime, Utc};
use std::time::Duration;

impl UploadService {
    /// Purges terminal records older than the retention window, then aborts
    /// sessions idle for longer than the session TTL. Each pass takes up to
    /// `sweep_batch_size` of its own candidates, oldest first.
    ///
    /// Backend failures while aborting are counted and logged; the session
    /// stays as it was and is picked up again by the next sweep.
    pub async fn expiry_sweep(&self) -> Result<SweepReport, UploadError> {
        let now = Utc::now();
        let mut report = SweepReport::default();

        let retention_cutoff = cutoff(now, self.config.terminal_retention());
        let finished = self
            .sessions
            .list_by_age(Lifecycle::Terminal, retention_cutoff, self.config.sweep_batch_size)
            .await?;
        for candidate in finished {
            let _guard = self.session_locks.lock(&candidate.id).await;
            // Re-read under the lock, the listing may be stale.
            let Some(session) = self.sessions.get(candidate.id).await? else {
                continue;
            };
            if session.status.is_terminal() && session.last_activity_at < retention_cutoff {
                self.sessions.delete(session.id).await?;
                report.purged += 1;
            }
        }

        let ttl_cutoff = cutoff(now, self.config.session_ttl());
        let idle = self
            .sessions
            .list_by_age(Lifecycle::Active, ttl_cutoff, self.config.sweep_batch_size)
            .await?;
        for candidate in idle {
            let _guard = self.session_locks.lock(&candidate.id).await;
            let Some(session) = self.sessions.get(candidate.id).await? else {
                continue;
            };
            if session.status.is_terminal() || session.last_activity_at >= ttl_cutoff {
                continue;
            }

            let session_id = session.id;
            match self.abort_locked(session).await {
                Ok(()) => {
                    tracing::info!("⏰ Expired idle upload session {}", session_id);
                    report.aborted += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to expire upload session {}: {}", session_id, e);
                    report.failed += 1;
                }
            }
        }

        self.session_locks.cleanup();
        self.part_locks.cleanup();

        Ok(report)
    }
}

fn cutoff(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
