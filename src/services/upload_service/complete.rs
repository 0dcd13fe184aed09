use super::{UploadError, UploadService, ensure_open};
use crate::models::{ObjectLocation, SessionStatus, UploadSession};
use crate::utils::validation::{validate_declared_order, validate_part_size};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

impl UploadService {
    /// Assembles the uploaded parts, in `declared_order`, into the final object.
    ///
    /// Holds the session lock throughout, so the manifest seen here contains
    /// every part whose upload finished before this call and no part can be
    /// added while it runs. Any failure puts the session back to `OPEN`; the
    /// caller can fix the part list or simply retry.
    pub async fn complete(
        &self,
        session_id: Uuid,
        declared_order: &[u32],
    ) -> Result<ObjectLocation, UploadError> {
        self.complete_with_etags(session_id, declared_order, &HashMap::new())
            .await
    }

    /// Like [`complete`](Self::complete), additionally requiring each part in
    /// `expected_etags` to still carry the given fingerprint.
    pub async fn complete_with_etags(
        &self,
        session_id: Uuid,
        declared_order: &[u32],
        expected_etags: &HashMap<u32, String>,
    ) -> Result<ObjectLocation, UploadError> {
        let _guard = self.session_locks.lock(&session_id).await;
        let mut session = self.load(session_id).await?;
        ensure_open(&session)?;

        session.set_status(SessionStatus::Completing);
        self.sessions.put(&session).await?;

        match self.compose(&session, declared_order, expected_etags).await {
            Ok(location) => {
                session.set_status(SessionStatus::Completed);
                if let Err(e) = self.sessions.put(&session).await {
                    tracing::error!(
                        "Object {} composed but session {} could not be marked completed: {}",
                        location.key,
                        session_id,
                        e
                    );
                    return Err(e.into());
                }

                tracing::info!(
                    session_id = %session_id,
                    object_key = %location.key,
                    size = location.size,
                    "Upload completed with {} parts",
                    declared_order.len()
                );
                Ok(location)
            }
            Err(err) => {
                session.set_status(SessionStatus::Open);
                if let Err(e) = self.sessions.put(&session).await {
                    tracing::error!("Session {} stuck in COMPLETING: {}", session_id, e);
                    return Err(e.into());
                }

                tracing::warn!("Completion of session {} rejected: {}", session_id, err);
                Err(err)
            }
        }
    }

    async fn compose(
        &self,
        session: &UploadSession,
        declared_order: &[u32],
        expected_etags: &HashMap<u32, String>,
    ) -> Result<ObjectLocation, UploadError> {
        let manifest: BTreeSet<u32> = session.parts.keys().copied().collect();
        validate_declared_order(declared_order, &manifest)?;

        let last = declared_order.len() - 1;
        for (position, part_number) in declared_order.iter().enumerate() {
            let part = session
                .parts
                .get(part_number)
                .ok_or(UploadError::MissingPart(*part_number))?;
            validate_part_size(*part_number, part.size, position == last, self.config.min_part_size)?;
            if let Some(etag) = expected_etags.get(part_number) {
                if etag.trim_matches('"') != part.fingerprint {
                    return Err(UploadError::InvalidPart(format!(
                        "etag mismatch for part {}",
                        part_number
                    )));
                }
            }
        }

        let received = session.received_bytes();
        if session.declared_size > 0 && received != session.declared_size {
            tracing::warn!(
                "Session {} declared {} bytes but received {}",
                session.id,
                session.declared_size,
                received
            );
        }

        let refs = session
            .part_refs(declared_order)
            .ok_or_else(|| UploadError::Internal("manifest changed during validation".to_string()))?;

        // Composition issues one backend request per part plus the final one.
        let timeout = self.config.compose_timeout(refs.len());
        match tokio::time::timeout(timeout, self.storage.compose_final(&session.handle(), &refs)).await {
            Ok(Ok(location)) => Ok(location),
            Ok(Err(e)) => Err(UploadError::CompletionFailed(e.to_string())),
            Err(_) => Err(UploadError::CompletionFailed(format!(
                "compose_final timed out after {:?}",
                timeout
            ))),
        }
    }
}
