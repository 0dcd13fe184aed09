//! Multipart upload coordinator.
//!
//! Owns every session state transition. Two families of critical sections
//! guard the session table:
//!
//! * a per-session lock around each read-modify-write of a session record
//!   (part commits, completion, abort, expiry), and
//! * a per-part lock spanning one part's adapter write and its manifest
//!   commit, so uploads of the same part number are applied in the order
//!   their adapter calls finish while different part numbers proceed in
//!   parallel.
//!
//! The part lock is always taken before the session lock, never the reverse.

use crate::config::UploadConfig;
use crate::models::{SessionStatus, UploadSession};
use crate::services::session_store::SessionStore;
use crate::services::storage::{ObjectStore, StorageError};
use crate::utils::keyed_mutex::KeyedMutex;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

mod abort;
mod complete;
mod error;
mod initiate;
mod part;
mod sweep;

pub use error::UploadError;

#[derive(Clone)]
pub struct UploadService {
    sessions: Arc<dyn SessionStore>,
    storage: Arc<dyn ObjectStore>,
    config: UploadConfig,
    session_locks: KeyedMutex<Uuid>,
    part_locks: KeyedMutex<(Uuid, u32)>,
}

impl UploadService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        storage: Arc<dyn ObjectStore>,
        config: UploadConfig,
    ) -> Self {
        Self {
            sessions,
            storage,
            config,
            session_locks: KeyedMutex::new(),
            part_locks: KeyedMutex::new(),
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub async fn get_session(&self, session_id: Uuid) -> Result<UploadSession, UploadError> {
        self.load(session_id).await
    }

    /// Sessions still accepting parts or mid-completion. Aborted and
    /// completed sessions are not listed.
    pub async fn list_active_sessions(&self) -> Result<Vec<UploadSession>, UploadError> {
        Ok(self.sessions.list_active().await?)
    }

    async fn load(&self, session_id: Uuid) -> Result<UploadSession, UploadError> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or(UploadError::SessionNotFound(session_id))
    }

    /// Bounds one adapter call by the configured backend timeout.
    async fn backend_call<T, F>(&self, operation: &str, call: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        let timeout = self.config.backend_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Unavailable(format!(
                "{} timed out after {:?}",
                operation, timeout
            ))),
        }
    }
}

fn ensure_open(session: &UploadSession) -> Result<(), UploadError> {
    if session.status != SessionStatus::Open {
        return Err(UploadError::SessionClosed {
            session_id: session.id,
            status: session.status,
        });
    }
    Ok(())
}
