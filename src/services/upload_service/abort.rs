use super::{UploadError, UploadService};
use crate::models::{SessionStatus, UploadSession};
use uuid::Uuid;

impl UploadService {
    /// Releases a session's backend resources and marks it `ABORTED`.
    ///
    /// Aborting an aborted session succeeds without doing anything. The
    /// record stays queryable until the sweep purges it.
    pub async fn abort(&self, session_id: Uuid) -> Result<(), UploadError> {
        let _guard = self.session_locks.lock(&session_id).await;
        let session = self.load(session_id).await?;
        self.abort_locked(session).await
    }

    /// Caller must hold the session lock.
    pub(super) async fn abort_locked(&self, mut session: UploadSession) -> Result<(), UploadError> {
        match session.status {
            SessionStatus::Aborted => {
                tracing::debug!("Session {} already aborted", session.id);
                return Ok(());
            }
            SessionStatus::Completed => {
                return Err(UploadError::SessionClosed {
                    session_id: session.id,
                    status: session.status,
                });
            }
            SessionStatus::Open | SessionStatus::Completing => {}
        }

        self.backend_call(
            "abort_multipart",
            self.storage.abort_multipart(&session.handle()),
        )
        .await?;

        session.set_status(SessionStatus::Aborted);
        self.sessions.put(&session).await?;

        tracing::info!(
            session_id = %session.id,
            object_key = %session.object_key,
            "Upload session aborted ({} parts released)",
            session.parts.len()
        );
        Ok(())
    }
}
