//! Persistence for upload sessions.
//!
//! Stores are passive: they never decide state transitions. Read-modify-write
//! sequences on one session are serialized by the coordinator, so a store
//! only has to be safe for concurrent access to distinct keys and atomic per
//! single call.

use crate::models::{SessionStatus, UploadSession};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub mod database;
pub mod memory;

pub use database::DatabaseSessionStore;
pub use memory::MemorySessionStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt session record: {0}")]
    Corrupt(String),
}

/// Which side of the lifecycle an age listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// `OPEN` or `COMPLETING`
    Active,
    /// `COMPLETED` or `ABORTED`
    Terminal,
}

impl Lifecycle {
    pub fn statuses(self) -> [SessionStatus; 2] {
        match self {
            Lifecycle::Active => [SessionStatus::Open, SessionStatus::Completing],
            Lifecycle::Terminal => [SessionStatus::Completed, SessionStatus::Aborted],
        }
    }

    pub fn contains(self, status: SessionStatus) -> bool {
        self.statuses().contains(&status)
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<UploadSession>, StoreError>;

    /// Inserts or replaces the record with the same id.
    async fn put(&self, session: &UploadSession) -> Result<(), StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Sessions in `lifecycle` idle since before `older_than`, least recently
    /// active first.
    async fn list_by_age(
        &self,
        lifecycle: Lifecycle,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<UploadSession>, StoreError>;

    /// Sessions that are still `OPEN` or `COMPLETING`, oldest first.
    async fn list_active(&self) -> Result<Vec<UploadSession>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}
