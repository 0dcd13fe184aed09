use super::{ObjectStore, StorageError, StoredPart};
use crate::models::{ObjectHandle, ObjectLocation, PartRef};
use crate::utils::hash::fingerprint;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use bytes::Bytes;
use uuid::Uuid;

const STAGING_PREFIX: &str = ".staging";

/// S3-compatible adapter (AWS, MinIO).
///
/// Each part upload is staged as its own object, keyed by part number and a
/// fresh version, so parts can arrive in any order and a re-upload never
/// touches the bytes already recorded for that number. Composition copies the
/// referenced versions into the native multipart upload with `UploadPartCopy`,
/// numbering them by their position in the declared order.
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    fn staging_prefix(key: &str) -> String {
        format!("{}/{}/", STAGING_PREFIX, key)
    }

    fn staging_key(key: &str, part_number: u32, version: &str) -> String {
        format!("{}part-{:05}-{}", Self::staging_prefix(key), part_number, version)
    }

    /// Once `CompleteMultipartUpload` has gone through, the upload id is gone
    /// and the object exists. A retried compose lands here.
    async fn finished_object(
        &self,
        handle: &ObjectHandle,
        size: u64,
    ) -> Result<ObjectLocation, StorageError> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&handle.key)
            .send()
            .await
            .map_err(|e| classify("head_object", e))?;

        let stored = head.content_length.unwrap_or(-1);
        if u64::try_from(stored).ok() != Some(size) {
            return Err(StorageError::Rejected(format!(
                "multipart upload {} no longer exists",
                handle.upload_id
            )));
        }

        tracing::info!("Object {} was already composed", handle.key);
        self.cleanup_staged(&handle.key).await;
        Ok(self.location(handle, size, head.e_tag))
    }

    async fn cleanup_staged(&self, key: &str) {
        if let Err(e) = self.delete_staged(key).await {
            tracing::warn!("Failed to delete staged parts for {}: {}", key, e);
        }
    }

    fn location(&self, handle: &ObjectHandle, size: u64, etag: Option<String>) -> ObjectLocation {
        ObjectLocation {
            key: handle.key.clone(),
            url: format!("{}/{}", self.bucket, handle.key),
            size,
            etag: etag.map(|t| t.trim_matches('"').to_string()),
        }
    }

    async fn list_staged(&self, key: &str) -> Result<Vec<String>, StorageError> {
        let prefix = Self::staging_prefix(key);
        let mut objects = Vec::new();
        let mut continuation_token = None;

        loop {
            let res = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&prefix)
                .set_continuation_token(continuation_token)
                .send()
                .await
                .map_err(|e| classify("list_objects_v2", e))?;

            if let Some(contents) = res.contents {
                objects.extend(contents.into_iter().filter_map(|o| o.key));
            }

            if res.is_truncated.unwrap_or(false) {
                continuation_token = res.next_continuation_token;
            } else {
                break;
            }
        }

        Ok(objects)
    }

    async fn delete_staged(&self, key: &str) -> Result<(), StorageError> {
        for staged in self.list_staged(key).await? {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&staged)
                .send()
                .await
                .map_err(|e| classify("delete_object", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn open_multipart(&self, key: &str) -> Result<ObjectHandle, StorageError> {
        let res = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify("create_multipart_upload", e))?;

        let upload_id = res
            .upload_id()
            .ok_or_else(|| StorageError::Rejected("no upload id returned".to_string()))?;

        Ok(ObjectHandle {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
        })
    }

    async fn put_part(
        &self,
        handle: &ObjectHandle,
        part_number: u32,
        data: Bytes,
    ) -> Result<StoredPart, StorageError> {
        let version = Uuid::new_v4().simple().to_string();
        let payload = data.clone();
        let res = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(Self::staging_key(&handle.key, part_number, &version))
            .body(ByteStream::from(payload))
            .send()
            .await
            .map_err(|e| classify("put_object", e))?;

        let etag = res
            .e_tag()
            .map(|t| t.trim_matches('"').to_string())
            .unwrap_or_else(|| fingerprint(&data));
        Ok(StoredPart { etag, version })
    }

    async fn compose_final(
        &self,
        handle: &ObjectHandle,
        parts: &[PartRef],
    ) -> Result<ObjectLocation, StorageError> {
        let size: u64 = parts.iter().map(|p| p.size).sum();
        let mut completed = Vec::with_capacity(parts.len());

        for (index, part) in parts.iter().enumerate() {
            let target_part = i32::try_from(index + 1)
                .map_err(|_| StorageError::Rejected("too many parts".to_string()))?;

            let res = match self
                .client
                .upload_part_copy()
                .bucket(&self.bucket)
                .key(&handle.key)
                .upload_id(&handle.upload_id)
                .part_number(target_part)
                .copy_source(format!(
                    "{}/{}",
                    self.bucket,
                    Self::staging_key(&handle.key, part.part_number, &part.version)
                ))
                .send()
                .await
            {
                Ok(res) => res,
                Err(e) if is_no_such_upload(&e) => return self.finished_object(handle, size).await,
                Err(e) => return Err(classify("upload_part_copy", e)),
            };

            let etag = res
                .copy_part_result()
                .and_then(|r| r.e_tag())
                .unwrap_or_default();

            completed.push(
                CompletedPart::builder()
                    .e_tag(etag)
                    .part_number(target_part)
                    .build(),
            );
        }

        let completed_multipart_upload = CompletedMultipartUpload::builder()
            .set_parts(Some(completed))
            .build();

        let res = match self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&handle.key)
            .upload_id(&handle.upload_id)
            .multipart_upload(completed_multipart_upload)
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) if is_no_such_upload(&e) => return self.finished_object(handle, size).await,
            Err(e) => return Err(classify("complete_multipart_upload", e)),
        };

        // The object is final from here on; nothing below may fail the call.
        self.cleanup_staged(&handle.key).await;

        Ok(self.location(handle, size, res.e_tag))
    }

    async fn abort_multipart(&self, handle: &ObjectHandle) -> Result<(), StorageError> {
        let res = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&handle.key)
            .upload_id(&handle.upload_id)
            .send()
            .await;

        if let Err(e) = res {
            if !is_no_such_upload(&e) {
                return Err(classify("abort_multipart_upload", e));
            }
            tracing::debug!("Multipart upload {} already released", handle.upload_id);
        }

        self.delete_staged(&handle.key).await
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| classify("head_bucket", e))?;
        Ok(())
    }
}

fn is_no_such_upload<E: ProvideErrorMetadata>(err: &SdkError<E, HttpResponse>) -> bool {
    err.as_service_error().and_then(|e| e.code()) == Some("NoSuchUpload")
}

/// Server-side 5xx, throttling and transport failures are retryable;
/// everything else the service answered with is permanent.
fn classify<E>(operation: &str, err: SdkError<E, HttpResponse>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let message = format!("{} failed: {}", operation, DisplayErrorContext(&err));

    match &err {
        SdkError::ServiceError(service) => {
            let status = service.raw().status().as_u16();
            let throttled = matches!(
                service.err().code(),
                Some("SlowDown" | "RequestTimeout" | "ServiceUnavailable" | "InternalError")
            );
            if status >= 500 || status == 429 || throttled {
                StorageError::Unavailable(message)
            } else {
                StorageError::Rejected(message)
            }
        }
        SdkError::ConstructionFailure(_) => StorageError::Rejected(message),
        _ => StorageError::Unavailable(message),
    }
}
