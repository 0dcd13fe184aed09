use super::{UploadError, UploadService, ensure_open};
use crate::models::{PartReceipt, PartRecord};
use crate::utils::validation::{validate_part_number, validate_part_payload};
use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

impl UploadService {
    /// Stores one part and records it in the session manifest, replacing any
    /// earlier upload of the same part number.
    ///
    /// The adapter write and the manifest commit run on a detached task: once
    /// started they finish together even if the caller stops waiting.
    ///
    /// Each upload is stored under a new backend version and only the
    /// manifest commit makes it visible to composition. An upload still in
    /// flight when `complete` runs can neither change the composed bytes nor
    /// be recorded afterwards.
    pub async fn accept_part(
        &self,
        session_id: Uuid,
        part_number: u32,
        data: Bytes,
    ) -> Result<PartReceipt, UploadError> {
        let this = self.clone();
        tokio::spawn(async move { this.store_part(session_id, part_number, data).await })
            .await
            .map_err(|e| UploadError::Internal(format!("part upload task failed: {}", e)))?
    }

    async fn store_part(
        &self,
        session_id: Uuid,
        part_number: u32,
        data: Bytes,
    ) -> Result<PartReceipt, UploadError> {
        let _part_guard = self.part_locks.lock(&(session_id, part_number)).await;

        let session = self.load(session_id).await?;
        ensure_open(&session)?;
        validate_part_number(part_number, self.config.max_parts)?;
        let size = data.len() as u64;
        validate_part_payload(part_number, size, self.config.max_part_size)?;

        let stored = self
            .backend_call(
                "put_part",
                self.storage.put_part(&session.handle(), part_number, data),
            )
            .await
            .inspect_err(|e| {
                tracing::warn!(
                    "Part {} of session {} was not stored: {}",
                    part_number,
                    session_id,
                    e
                )
            })?;

        let _session_guard = self.session_locks.lock(&session_id).await;
        let mut session = self.load(session_id).await?;
        // Completion or abort may have started while the part was in flight.
        ensure_open(&session)?;

        session.record_part(
            part_number,
            PartRecord {
                fingerprint: stored.etag.clone(),
                size,
                version: stored.version,
                received_at: Utc::now(),
            },
        );
        self.sessions.put(&session).await?;

        tracing::debug!(
            session_id = %session_id,
            part_number,
            size,
            "Part stored ({} parts in manifest)",
            session.parts.len()
        );

        Ok(PartReceipt {
            part_number,
            etag: stored.etag,
            size,
        })
    }
}
