use super::{Lifecycle, SessionStore, StoreError};
use crate::entities::{prelude::*, upload_sessions};
use crate::models::{PartRecord, SessionStatus, UploadSession};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Manifest entry as stored in the `parts` JSON column.
#[derive(Serialize, Deserialize, Debug)]
struct ManifestEntry {
    part_number: u32,
    fingerprint: String,
    size: u64,
    version: String,
    received_at: DateTime<Utc>,
}

/// Sessions persisted through SeaORM (SQLite or PostgreSQL).
#[derive(Clone)]
pub struct DatabaseSessionStore {
    db: DatabaseConnection,
}

impl DatabaseSessionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn to_active_model(session: &UploadSession) -> Result<upload_sessions::ActiveModel, StoreError> {
    let parts: Vec<ManifestEntry> = session
        .parts
        .iter()
        .map(|(number, part)| ManifestEntry {
            part_number: *number,
            fingerprint: part.fingerprint.clone(),
            size: part.size,
            version: part.version.clone(),
            received_at: part.received_at,
        })
        .collect();

    let declared_size = i64::try_from(session.declared_size)
        .map_err(|_| StoreError::Corrupt(format!("declared size {} overflows", session.declared_size)))?;

    Ok(upload_sessions::ActiveModel {
        id: Set(session.id.to_string()),
        target_name: Set(session.target_name.clone()),
        object_key: Set(session.object_key.clone()),
        upload_id: Set(session.upload_id.clone()),
        declared_size: Set(declared_size),
        status: Set(session.status.as_str().to_string()),
        parts: Set(serde_json::to_value(parts)?),
        created_at: Set(session.created_at),
        last_activity_at: Set(session.last_activity_at),
    })
}

fn from_model(model: upload_sessions::Model) -> Result<UploadSession, StoreError> {
    let id = Uuid::parse_str(&model.id)
        .map_err(|e| StoreError::Corrupt(format!("session id '{}': {}", model.id, e)))?;
    let status: SessionStatus = model.status.parse().map_err(StoreError::Corrupt)?;
    let declared_size = u64::try_from(model.declared_size)
        .map_err(|_| StoreError::Corrupt(format!("negative declared size for {}", model.id)))?;

    let stored: Vec<ManifestEntry> = serde_json::from_value(model.parts)?;
    let parts = stored
        .into_iter()
        .map(|p| {
            (
                p.part_number,
                PartRecord {
                    fingerprint: p.fingerprint,
                    size: p.size,
                    version: p.version,
                    received_at: p.received_at,
                },
            )
        })
        .collect();

    Ok(UploadSession {
        id,
        target_name: model.target_name,
        object_key: model.object_key,
        upload_id: model.upload_id,
        declared_size,
        status,
        parts,
        created_at: model.created_at,
        last_activity_at: model.last_activity_at,
    })
}

#[async_trait]
impl SessionStore for DatabaseSessionStore {
    async fn get(&self, id: Uuid) -> Result<Option<UploadSession>, StoreError> {
        UploadSessions::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .map(from_model)
            .transpose()
    }

    async fn put(&self, session: &UploadSession) -> Result<(), StoreError> {
        let model = to_active_model(session)?;

        UploadSessions::insert(model)
            .on_conflict(
                OnConflict::column(upload_sessions::Column::Id)
                    .update_columns([
                        upload_sessions::Column::Status,
                        upload_sessions::Column::Parts,
                        upload_sessions::Column::LastActivityAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        UploadSessions::delete_by_id(id.to_string())
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn list_by_age(
        &self,
        lifecycle: Lifecycle,
        older_than: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<UploadSession>, StoreError> {
        UploadSessions::find()
            .filter(upload_sessions::Column::Status.is_in(lifecycle.statuses().map(|s| s.as_str())))
            .filter(upload_sessions::Column::LastActivityAt.lt(older_than))
            .order_by_asc(upload_sessions::Column::LastActivityAt)
            .limit(limit)
            .all(&self.db)
            .await?
            .into_iter()
            .map(from_model)
            .collect()
    }

    async fn list_active(&self) -> Result<Vec<UploadSession>, StoreError> {
        UploadSessions::find()
            .filter(upload_sessions::Column::Status.is_in(Lifecycle::Active.statuses().map(|s| s.as_str())))
            .order_by_asc(upload_sessions::Column::CreatedAt)
            .all(&self.db)
            .await?
            .into_iter()
            .map(from_model)
            .collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db.ping().await?;
        Ok(())
    }
}
