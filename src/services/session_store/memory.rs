use super::{Lifecycle, SessionStore, StoreError};
use crate::models::UploadSession;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

/// Session table kept in process memory; lost on restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<Uuid, UploadSession>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, id: Uuid) -> Result<Option<UploadSession>, StoreError> {
        Ok(self.sessions.get(&id).map(|s| s.value().clone()))
    }

    async fn put(&self, session: &UploadSession) -> Result<(), StoreError> {
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.sessions.remove(&id);
        Ok(())
    }

    async fn list_by_age(
        &self,
        lifecycle: Lifecycle,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<UploadSession>, StoreError> {
        let mut stale: Vec<UploadSession> = self
            .sessions
            .iter()
            .filter(|s| lifecycle.contains(s.status) && s.last_activity_at < older_than)
            .map(|s| s.value().clone())
            .collect();

        stale.sort_by_key(|s| s.last_activity_at);
        stale.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(stale)
    }

    async fn list_active(&self) -> Result<Vec<UploadSession>, StoreError> {
        let mut active: Vec<UploadSession> = self
            .sessions
            .iter()
            .filter(|s| !s.status.is_terminal())
            .map(|s| s.value().clone())
            .collect();

        active.sort_by_key(|s| s.created_at);
        Ok(active)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
