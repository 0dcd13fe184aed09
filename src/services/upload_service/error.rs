use crate::models::SessionStatus;
use crate::services::session_store::StoreError;
use crate::services::storage::StorageError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Upload session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Upload session {session_id} is {status}")]
    SessionClosed {
        session_id: Uuid,
        status: SessionStatus,
    },

    #[error("Invalid part: {0}")]
    InvalidPart(String),

    #[error("Part {0} has not been uploaded")]
    MissingPart(u32),

    #[error("Part {0} is listed more than once")]
    DuplicatePart(u32),

    #[error("Part {part_number} is {size} bytes, below the {minimum} byte minimum")]
    PartTooSmall {
        part_number: u32,
        size: u64,
        minimum: u64,
    },

    #[error("Storage backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Storage backend rejected the request: {0}")]
    BackendRejected(String),

    #[error("Completion failed: {0}")]
    CompletionFailed(String),

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl UploadError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            UploadError::InvalidArgument(_) => "INVALID_ARGUMENT",
            UploadError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            UploadError::SessionClosed { .. } => "SESSION_CLOSED",
            UploadError::InvalidPart(_) => "INVALID_PART",
            UploadError::MissingPart(_) => "MISSING_PART",
            UploadError::DuplicatePart(_) => "DUPLICATE_PART",
            UploadError::PartTooSmall { .. } => "PART_TOO_SMALL",
            UploadError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            UploadError::BackendRejected(_) => "BACKEND_REJECTED",
            UploadError::CompletionFailed(_) => "COMPLETION_FAILED",
            UploadError::Store(_) => "STORE_ERROR",
            UploadError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether repeating the same call unchanged may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::BackendUnavailable(_) | UploadError::CompletionFailed(_)
        )
    }
}

impl From<StorageError> for UploadError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable(msg) => UploadError::BackendUnavailable(msg),
            StorageError::Rejected(msg) => UploadError::BackendRejected(msg),
        }
    }
}
