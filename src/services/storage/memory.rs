use super::{ObjectStore, StorageError, StoredPart};
use crate::models::{ObjectHandle, ObjectLocation, PartRef};
use crate::utils::hash::{composite_fingerprint, fingerprint};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use std::collections::HashMap;
use uuid::Uuid;

struct PendingUpload {
    key: String,
    parts: HashMap<(u32, String), Bytes>,
}

/// Process-local object store for development mode and tests.
#[derive(Default)]
pub struct InMemoryObjectStore {
    pending: DashMap<String, PendingUpload>,
    objects: DashMap<String, Bytes>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contents of a composed object.
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.get(key).map(|o| o.value().clone())
    }

    pub fn stored_part(
        &self,
        handle: &ObjectHandle,
        part_number: u32,
        version: &str,
    ) -> Option<Bytes> {
        self.pending
            .get(&handle.upload_id)
            .and_then(|p| p.parts.get(&(part_number, version.to_string())).cloned())
    }

    /// Number of stored versions across all part numbers of an upload.
    pub fn stored_versions(&self, handle: &ObjectHandle) -> usize {
        self.pending
            .get(&handle.upload_id)
            .map(|p| p.parts.len())
            .unwrap_or(0)
    }

    pub fn is_open(&self, handle: &ObjectHandle) -> bool {
        self.pending.contains_key(&handle.upload_id)
    }

    pub fn open_uploads(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn open_multipart(&self, key: &str) -> Result<ObjectHandle, StorageError> {
        let upload_id = Uuid::new_v4().to_string();
        self.pending.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                parts: HashMap::new(),
            },
        );
        Ok(ObjectHandle {
            key: key.to_string(),
            upload_id,
        })
    }

    async fn put_part(
        &self,
        handle: &ObjectHandle,
        part_number: u32,
        data: Bytes,
    ) -> Result<StoredPart, StorageError> {
        let mut pending = self
            .pending
            .get_mut(&handle.upload_id)
            .ok_or_else(|| StorageError::Rejected(format!("no such upload: {}", handle.upload_id)))?;

        let etag = fingerprint(&data);
        let version = Uuid::new_v4().simple().to_string();
        pending.parts.insert((part_number, version.clone()), data);
        Ok(StoredPart { etag, version })
    }

    async fn compose_final(
        &self,
        handle: &ObjectHandle,
        parts: &[PartRef],
    ) -> Result<ObjectLocation, StorageError> {
        let (key, body, etags) = {
            let pending = self.pending.get(&handle.upload_id).ok_or_else(|| {
                StorageError::Rejected(format!("no such upload: {}", handle.upload_id))
            })?;

            let mut body = BytesMut::new();
            let mut etags = Vec::with_capacity(parts.len());
            for part in parts {
                let data = pending
                    .parts
                    .get(&(part.part_number, part.version.clone()))
                    .ok_or_else(|| {
                        StorageError::Rejected(format!(
                            "part {} version {} was never stored",
                            part.part_number, part.version
                        ))
                    })?;
                body.extend_from_slice(data);
                etags.push(fingerprint(data));
            }
            (pending.key.clone(), body.freeze(), etags)
        };

        self.pending.remove(&handle.upload_id);
        let size = body.len() as u64;
        self.objects.insert(key.clone(), body);

        Ok(ObjectLocation {
            url: format!("memory://{}", key),
            key,
            size,
            etag: Some(composite_fingerprint(etags.iter().map(String::as_str))),
        })
    }

    async fn abort_multipart(&self, handle: &ObjectHandle) -> Result<(), StorageError> {
        self.pending.remove(&handle.upload_id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
