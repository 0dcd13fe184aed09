use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Open,
    Completing,
    Completed,
    Aborted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Open => "OPEN",
            SessionStatus::Completing => "COMPLETING",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Aborted => "ABORTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Aborted)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(SessionStatus::Open),
            "COMPLETING" => Ok(SessionStatus::Completing),
            "COMPLETED" => Ok(SessionStatus::Completed),
            "ABORTED" => Ok(SessionStatus::Aborted),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

/// Manifest entry for one stored part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PartRecord {
    pub fingerprint: String,
    pub size: u64,
    /// Backend version of this upload of the part. Every upload is stored
    /// under its own version, so later uploads never touch recorded bytes.
    pub version: String,
    pub received_at: DateTime<Utc>,
}

/// One recorded part as handed to composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartRef {
    pub part_number: u32,
    pub version: String,
    pub size: u64,
}

/// Backend reference for an open multipart object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectHandle {
    pub key: String,
    pub upload_id: String,
}

/// Server-held state of one multipart upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSession {
    pub id: Uuid,
    pub target_name: String,
    pub object_key: String,
    pub upload_id: String,
    pub declared_size: u64,
    pub status: SessionStatus,
    pub parts: BTreeMap<u32, PartRecord>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(target_name: String, declared_size: u64, handle: ObjectHandle) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            target_name,
            object_key: handle.key,
            upload_id: handle.upload_id,
            declared_size,
            status: SessionStatus::Open,
            parts: BTreeMap::new(),
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn handle(&self) -> ObjectHandle {
        ObjectHandle {
            key: self.object_key.clone(),
            upload_id: self.upload_id.clone(),
        }
    }

    /// Replaces any previous entry for the same part number.
    pub fn record_part(&mut self, part_number: u32, record: PartRecord) {
        self.last_activity_at = record.received_at;
        self.parts.insert(part_number, record);
    }

    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.last_activity_at = Utc::now();
    }

    pub fn received_bytes(&self) -> u64 {
        self.parts.values().map(|p| p.size).sum()
    }

    /// Manifest references for `order`, `None` if a number is not recorded.
    pub fn part_refs(&self, order: &[u32]) -> Option<Vec<PartRef>> {
        order
            .iter()
            .map(|n| {
                self.parts.get(n).map(|p| PartRef {
                    part_number: *n,
                    version: p.version.clone(),
                    size: p.size,
                })
            })
            .collect()
    }
}

/// Returned to the caller after a part has been stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PartReceipt {
    pub part_number: u32,
    pub etag: String,
    pub size: u64,
}

/// Where the composed object ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectLocation {
    pub key: String,
    pub url: String,
    pub size: u64,
    pub etag: Option<String>,
}

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub aborted: usize,
    pub purged: usize,
    pub failed: usize,
}
