use super::{UploadError, UploadService};
use crate::models::UploadSession;
use crate::utils::object_key::generate_object_key;
use crate::utils::validation::{validate_declared_size, validate_target_name};

impl UploadService {
    /// Opens a backend multipart object and records a new `OPEN` session for it.
    ///
    /// Nothing is persisted unless the backend object was opened, and the
    /// backend object is released again if the session cannot be persisted.
    pub async fn initiate(
        &self,
        target_name: &str,
        declared_size: u64,
    ) -> Result<UploadSession, UploadError> {
        validate_target_name(target_name)?;
        validate_declared_size(declared_size, self.config.max_declared_size)?;

        let object_key = generate_object_key(target_name);
        let handle = self
            .backend_call("open_multipart", self.storage.open_multipart(&object_key))
            .await
            .inspect_err(|e| tracing::warn!("Failed to open multipart object {}: {}", object_key, e))?;

        let session = UploadSession::new(target_name.to_string(), declared_size, handle);

        if let Err(e) = self.sessions.put(&session).await {
            tracing::error!("Failed to persist upload session {}: {}", session.id, e);
            if let Err(abort_err) = self
                .backend_call("abort_multipart", self.storage.abort_multipart(&session.handle()))
                .await
            {
                tracing::warn!(
                    "Orphaned multipart object {} ({}): {}",
                    session.object_key,
                    session.upload_id,
                    abort_err
                );
            }
            return Err(e.into());
        }

        tracing::info!(
            session_id = %session.id,
            object_key = %session.object_key,
            declared_size,
            "Upload session opened for {}",
            session.target_name
        );

        Ok(session)
    }
}
