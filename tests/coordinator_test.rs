use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use rust_upload_coordinator::config::UploadConfig;
use rust_upload_coordinator::models::{ObjectHandle, ObjectLocation, PartRef, SessionStatus};
use rust_upload_coordinator::services::session_store::{MemorySessionStore, SessionStore};
use rust_upload_coordinator::services::storage::{
    InMemoryObjectStore, ObjectStore, StorageError, StoredPart,
};
use rust_upload_coordinator::services::upload_service::{UploadError, UploadService};
use rust_upload_coordinator::utils::hash::fingerprint;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Delegates to the in-memory store with adjustable latency: `put_delay_ms`
/// before a part is written, `ack_delay_ms` after it was written but before
/// the call returns, `compose_delay_ms` before composing.
struct TestStore {
    inner: Arc<InMemoryObjectStore>,
    put_delay_ms: AtomicU64,
    ack_delay_ms: AtomicU64,
    compose_delay_ms: AtomicU64,
    fail_compose: AtomicBool,
}

impl TestStore {
    fn new(inner: Arc<InMemoryObjectStore>) -> Self {
        Self {
            inner,
            put_delay_ms: AtomicU64::new(0),
            ack_delay_ms: AtomicU64::new(0),
            compose_delay_ms: AtomicU64::new(0),
            fail_compose: AtomicBool::new(false),
        }
    }

    fn with_put_delay(inner: Arc<InMemoryObjectStore>, delay: Duration) -> Self {
        let store = Self::new(inner);
        store.put_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
        store
    }
}

async fn pause(millis: &AtomicU64) {
    let ms = millis.load(Ordering::SeqCst);
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[async_trait]
impl ObjectStore for TestStore {
    async fn open_multipart(&self, key: &str) -> Result<ObjectHandle, StorageError> {
        self.inner.open_multipart(key).await
    }

    async fn put_part(
        &self,
        handle: &ObjectHandle,
        part_number: u32,
        data: Bytes,
    ) -> Result<StoredPart, StorageError> {
        pause(&self.put_delay_ms).await;
        let stored = self.inner.put_part(handle, part_number, data).await?;
        pause(&self.ack_delay_ms).await;
        Ok(stored)
    }

    async fn compose_final(
        &self,
        handle: &ObjectHandle,
        parts: &[PartRef],
    ) -> Result<ObjectLocation, StorageError> {
        pause(&self.compose_delay_ms).await;
        if self.fail_compose.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("SlowDown: please reduce your request rate".into()));
        }
        self.inner.compose_final(handle, parts).await
    }

    async fn abort_multipart(&self, handle: &ObjectHandle) -> Result<(), StorageError> {
        self.inner.abort_multipart(handle).await
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

fn test_config() -> UploadConfig {
    UploadConfig {
        min_part_size: 4,
        ..UploadConfig::development()
    }
}

struct Harness {
    service: UploadService,
    sessions: Arc<MemorySessionStore>,
    objects: Arc<InMemoryObjectStore>,
}

fn harness(config: UploadConfig) -> Harness {
    let objects = Arc::new(InMemoryObjectStore::new());
    harness_with(config, objects.clone(), objects)
}

fn harness_with(
    config: UploadConfig,
    objects: Arc<InMemoryObjectStore>,
    store: Arc<dyn ObjectStore>,
) -> Harness {
    let sessions = Arc::new(MemorySessionStore::new());
    let service = UploadService::new(sessions.clone(), store, config);
    Harness {
        service,
        sessions,
        objects,
    }
}

fn payload(byte: u8, len: usize) -> Bytes {
    Bytes::from(vec![byte; len])
}

#[tokio::test]
async fn test_three_part_video_upload() {
    let h = harness(UploadConfig {
        min_part_size: 5_000_000,
        ..UploadConfig::development()
    });

    let session = h.service.initiate("video.mp4", 15_000_000).await.unwrap();
    assert_eq!(session.status, SessionStatus::Open);
    assert!(session.object_key.ends_with(".mp4"));

    for (part_number, byte) in [(1u32, b'a'), (2, b'b'), (3, b'c')] {
        let receipt = h
            .service
            .accept_part(session.id, part_number, payload(byte, 5_000_000))
            .await
            .unwrap();
        assert_eq!(receipt.part_number, part_number);
        assert_eq!(receipt.size, 5_000_000);
    }

    let location = h.service.complete(session.id, &[1, 2, 3]).await.unwrap();
    assert_eq!(location.key, session.object_key);
    assert_eq!(location.size, 15_000_000);

    let object = h.objects.object(&location.key).unwrap();
    assert_eq!(object.len(), 15_000_000);
    assert_eq!(object[0], b'a');
    assert_eq!(object[5_000_000], b'b');
    assert_eq!(object[14_999_999], b'c');

    let stored = h.service.get_session(session.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);

    let err = h
        .service
        .accept_part(session.id, 4, payload(b'd', 10))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UploadError::SessionClosed {
            status: SessionStatus::Completed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_parts_uploaded_out_of_order_are_composed_in_declared_order() {
    let h = harness(test_config());
    let session = h.service.initiate("notes.txt", 0).await.unwrap();

    h.service.accept_part(session.id, 3, Bytes::from_static(b"cc")).await.unwrap();
    h.service.accept_part(session.id, 1, Bytes::from_static(b"aaaa")).await.unwrap();
    h.service.accept_part(session.id, 2, Bytes::from_static(b"bbbb")).await.unwrap();

    let location = h.service.complete(session.id, &[1, 2, 3]).await.unwrap();
    assert_eq!(h.objects.object(&location.key).unwrap(), Bytes::from_static(b"aaaabbbbcc"));
}

#[tokio::test]
async fn test_only_the_last_declared_part_may_be_small() {
    let h = harness(test_config());
    let session = h.service.initiate("small.bin", 0).await.unwrap();

    h.service.accept_part(session.id, 1, Bytes::from_static(b"xy")).await.unwrap();
    h.service.accept_part(session.id, 2, Bytes::from_static(b"zzzz")).await.unwrap();

    let err = h.service.complete(session.id, &[1, 2]).await.unwrap_err();
    assert!(matches!(
        err,
        UploadError::PartTooSmall {
            part_number: 1,
            size: 2,
            minimum: 4
        }
    ));

    // Placing the short part last is fine.
    let location = h.service.complete(session.id, &[2, 1]).await.unwrap();
    assert_eq!(h.objects.object(&location.key).unwrap(), Bytes::from_static(b"zzzzxy"));
}

#[tokio::test]
async fn test_duplicate_part_in_declared_order() {
    let h = harness(test_config());
    let session = h.service.initiate("dup.bin", 0).await.unwrap();
    h.service.accept_part(session.id, 1, payload(1, 4)).await.unwrap();
    h.service.accept_part(session.id, 2, payload(2, 4)).await.unwrap();

    let err = h.service.complete(session.id, &[1, 1, 2]).await.unwrap_err();
    assert!(matches!(err, UploadError::DuplicatePart(1)));

    let stored = h.service.get_session(session.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Open);

    h.service.complete(session.id, &[1, 2]).await.unwrap();
}

#[tokio::test]
async fn test_missing_parts_in_declared_order() {
    let h = harness(test_config());
    let session = h.service.initiate("gap.bin", 0).await.unwrap();
    h.service.accept_part(session.id, 1, payload(1, 4)).await.unwrap();
    h.service.accept_part(session.id, 2, payload(2, 4)).await.unwrap();

    let err = h.service.complete(session.id, &[1, 2, 3]).await.unwrap_err();
    assert!(matches!(err, UploadError::MissingPart(3)));

    let err = h.service.complete(session.id, &[1]).await.unwrap_err();
    assert!(matches!(err, UploadError::MissingPart(2)));

    let err = h.service.complete(session.id, &[]).await.unwrap_err();
    assert!(matches!(err, UploadError::InvalidArgument(_)));

    assert_eq!(
        h.service.get_session(session.id).await.unwrap().status,
        SessionStatus::Open
    );
}

#[tokio::test]
async fn test_reuploading_a_part_replaces_it() {
    let h = harness(test_config());
    let session = h.service.initiate("retry.bin", 0).await.unwrap();

    h.service.accept_part(session.id, 1, Bytes::from_static(b"aaaa")).await.unwrap();
    let receipt = h
        .service
        .accept_part(session.id, 1, Bytes::from_static(b"bbbb"))
        .await
        .unwrap();
    h.service.accept_part(session.id, 2, Bytes::from_static(b"cc")).await.unwrap();

    assert_eq!(receipt.etag, fingerprint(b"bbbb"));
    let stored = h.service.get_session(session.id).await.unwrap();
    assert_eq!(stored.parts.len(), 2);
    assert_eq!(stored.parts[&1].fingerprint, fingerprint(b"bbbb"));

    let location = h.service.complete(session.id, &[1, 2]).await.unwrap();
    assert_eq!(h.objects.object(&location.key).unwrap(), Bytes::from_static(b"bbbbcc"));
}

#[tokio::test]
async fn test_concurrent_distinct_parts_are_all_recorded() {
    let h = harness(test_config());
    let session = h.service.initiate("parallel.bin", 0).await.unwrap();
    let id = session.id;

    let uploads = (1..=16u32).map(|n| {
        let service = h.service.clone();
        async move { service.accept_part(id, n, payload(n as u8, 8)).await }
    });
    for result in join_all(uploads).await {
        result.unwrap();
    }

    let stored = h.service.get_session(session.id).await.unwrap();
    assert_eq!(stored.parts.len(), 16);
    assert_eq!(stored.received_bytes(), 16 * 8);

    let order: Vec<u32> = (1..=16).collect();
    let location = h.service.complete(session.id, &order).await.unwrap();
    assert_eq!(location.size, 16 * 8);
}

#[tokio::test]
async fn test_concurrent_uploads_of_same_part_leave_consistent_manifest() {
    let h = harness(test_config());
    let session = h.service.initiate("race.bin", 0).await.unwrap();
    let id = session.id;

    let uploads = (0..8u8).map(|i| {
        let service = h.service.clone();
        async move { service.accept_part(id, 1, payload(i, 6)).await }
    });
    for result in join_all(uploads).await {
        result.unwrap();
    }

    let stored = h.service.get_session(session.id).await.unwrap();
    assert_eq!(stored.parts.len(), 1);
    let part = &stored.parts[&1];
    let stored_bytes = h
        .objects
        .stored_part(&stored.handle(), 1, &part.version)
        .unwrap();
    assert_eq!(stored.parts[&1].fingerprint, fingerprint(&stored_bytes));
}

#[tokio::test]
async fn test_part_validation() {
    let h = harness(UploadConfig {
        max_parts: 3,
        max_part_size: 8,
        ..test_config()
    });
    let session = h.service.initiate("bounds.bin", 0).await.unwrap();

    for (part_number, data) in [
        (0u32, payload(1, 4)),
        (4, payload(1, 4)),
        (1, Bytes::new()),
        (1, payload(1, 9)),
    ] {
        let err = h
            .service
            .accept_part(session.id, part_number, data)
            .await
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidPart(_)), "got {:?}", err);
    }

    assert!(h.service.get_session(session.id).await.unwrap().parts.is_empty());
}

#[tokio::test]
async fn test_initiate_validation() {
    let h = harness(UploadConfig {
        max_declared_size: 100,
        ..test_config()
    });

    assert!(matches!(
        h.service.initiate("", 0).await,
        Err(UploadError::InvalidArgument(_))
    ));
    assert!(matches!(
        h.service.initiate("big.bin", 101).await,
        Err(UploadError::InvalidArgument(_))
    ));
    assert!(h.sessions.is_empty());
    assert_eq!(h.objects.open_uploads(), 0);
}

#[tokio::test]
async fn test_unknown_session() {
    let h = harness(test_config());
    let unknown = Uuid::new_v4();

    assert!(matches!(
        h.service.accept_part(unknown, 1, payload(1, 4)).await,
        Err(UploadError::SessionNotFound(id)) if id == unknown
    ));
    assert!(matches!(
        h.service.complete(unknown, &[1]).await,
        Err(UploadError::SessionNotFound(_))
    ));
    assert!(matches!(
        h.service.abort(unknown).await,
        Err(UploadError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn test_complete_twice_is_rejected() {
    let h = harness(test_config());
    let session = h.service.initiate("once.bin", 0).await.unwrap();
    h.service.accept_part(session.id, 1, payload(1, 4)).await.unwrap();
    h.service.complete(session.id, &[1]).await.unwrap();

    let err = h.service.complete(session.id, &[1]).await.unwrap_err();
    assert!(matches!(
        err,
        UploadError::SessionClosed {
            status: SessionStatus::Completed,
            ..
        }
    ));
    assert!(matches!(
        h.service.abort(session.id).await,
        Err(UploadError::SessionClosed { .. })
    ));
}

#[tokio::test]
async fn test_abort_is_idempotent_and_releases_parts() {
    let h = harness(test_config());
    let session = h.service.initiate("cancel.bin", 0).await.unwrap();
    h.service.accept_part(session.id, 1, payload(1, 4)).await.unwrap();
    assert!(h.objects.is_open(&session.handle()));

    h.service.abort(session.id).await.unwrap();
    h.service.abort(session.id).await.unwrap();

    assert!(!h.objects.is_open(&session.handle()));
    assert_eq!(
        h.service.get_session(session.id).await.unwrap().status,
        SessionStatus::Aborted
    );

    let err = h
        .service
        .accept_part(session.id, 2, payload(2, 4))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UploadError::SessionClosed {
            status: SessionStatus::Aborted,
            ..
        }
    ));
    assert!(matches!(
        h.service.complete(session.id, &[1]).await,
        Err(UploadError::SessionClosed { .. })
    ));
}

#[tokio::test]
async fn test_failed_composition_reopens_session() {
    let objects = Arc::new(InMemoryObjectStore::new());
    let store = Arc::new(TestStore::new(objects.clone()));
    let h = harness_with(test_config(), objects, store.clone());

    let session = h.service.initiate("flaky.bin", 0).await.unwrap();
    h.service.accept_part(session.id, 1, payload(1, 4)).await.unwrap();
    h.service.accept_part(session.id, 2, payload(2, 2)).await.unwrap();

    store.fail_compose.store(true, Ordering::SeqCst);
    let err = h.service.complete(session.id, &[1, 2]).await.unwrap_err();
    assert!(matches!(err, UploadError::CompletionFailed(_)));
    assert!(err.is_retryable());

    let stored = h.service.get_session(session.id).await.unwrap();
    assert_eq!(stored.status, SessionStatus::Open);
    assert_eq!(stored.parts.len(), 2);

    store.fail_compose.store(false, Ordering::SeqCst);
    let location = h.service.complete(session.id, &[1, 2]).await.unwrap();
    assert_eq!(location.size, 6);
}

#[tokio::test]
async fn test_etag_mismatch_is_rejected() {
    let h = harness(test_config());
    let session = h.service.initiate("etag.bin", 0).await.unwrap();
    let receipt = h.service.accept_part(session.id, 1, payload(1, 4)).await.unwrap();

    let wrong = HashMap::from([(1u32, "not-the-etag".to_string())]);
    let err = h
        .service
        .complete_with_etags(session.id, &[1], &wrong)
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::InvalidPart(_)));
    assert_eq!(
        h.service.get_session(session.id).await.unwrap().status,
        SessionStatus::Open
    );

    let quoted = HashMap::from([(1u32, format!("\"{}\"", receipt.etag))]);
    h.service
        .complete_with_etags(session.id, &[1], &quoted)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let objects = Arc::new(InMemoryObjectStore::new());
    let store = Arc::new(TestStore::with_put_delay(objects.clone(), Duration::from_secs(3)));
    let h = harness_with(
        UploadConfig {
            backend_timeout_secs: 1,
            ..test_config()
        },
        objects,
        store,
    );

    let session = h.service.initiate("slow.bin", 0).await.unwrap();
    let err = h
        .service
        .accept_part(session.id, 1, payload(1, 4))
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::BackendUnavailable(_)));
    assert!(h.service.get_session(session.id).await.unwrap().parts.is_empty());
}

#[tokio::test]
async fn test_cancelled_part_upload_still_commits() {
    let objects = Arc::new(InMemoryObjectStore::new());
    let store = Arc::new(TestStore::with_put_delay(
        objects.clone(),
        Duration::from_millis(200),
    ));
    let h = harness_with(test_config(), objects, store);
    let session = h.service.initiate("detached.bin", 0).await.unwrap();

    let caller_gave_up = tokio::time::timeout(
        Duration::from_millis(20),
        h.service.accept_part(session.id, 1, payload(7, 4)),
    )
    .await;
    assert!(caller_gave_up.is_err());

    tokio::time::sleep(Duration::from_millis(500)).await;

    let stored = h.service.get_session(session.id).await.unwrap();
    assert_eq!(stored.parts[&1].fingerprint, fingerprint(&[7u8; 4]));
    assert!(
        h.objects
            .stored_part(&stored.handle(), 1, &stored.parts[&1].version)
            .is_some()
    );
}

#[tokio::test]
async fn test_sweep_expires_idle_sessions_then_purges_them() {
    let h = harness(UploadConfig {
        session_ttl_secs: 0,
        terminal_retention_secs: 0,
        ..test_config()
    });
    let session = h.service.initiate("idle.bin", 0).await.unwrap();
    h.service.accept_part(session.id, 1, payload(1, 4)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let report = h.service.expiry_sweep().await.unwrap();
    assert_eq!(report.aborted, 1);
    assert_eq!(report.purged, 0);
    assert_eq!(
        h.service.get_session(session.id).await.unwrap().status,
        SessionStatus::Aborted
    );
    assert!(!h.objects.is_open(&session.handle()));

    tokio::time::sleep(Duration::from_millis(10)).await;
    let report = h.service.expiry_sweep().await.unwrap();
    assert_eq!(report.purged, 1);
    assert!(h.sessions.get(session.id).await.unwrap().is_none());
    assert!(matches!(
        h.service.abort(session.id).await,
        Err(UploadError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn test_sweep_keeps_active_sessions() {
    let h = harness(test_config());
    let session = h.service.initiate("fresh.bin", 0).await.unwrap();

    let report = h.service.expiry_sweep().await.unwrap();
    assert_eq!(report.aborted, 0);
    assert_eq!(report.purged, 0);
    assert_eq!(
        h.service.get_session(session.id).await.unwrap().status,
        SessionStatus::Open
    );
}

#[tokio::test]
async fn test_listing_shows_only_active_sessions() {
    let h = harness(test_config());
    let open = h.service.initiate("open.bin", 0).await.unwrap();
    let aborted = h.service.initiate("gone.bin", 0).await.unwrap();
    h.service.abort(aborted.id).await.unwrap();

    let active = h.service.list_active_sessions().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, open.id);
}

#[tokio::test]
async fn test_part_upload_in_flight_during_completion_does_not_change_object() {
    let objects = Arc::new(InMemoryObjectStore::new());
    let store = Arc::new(TestStore::new(objects.clone()));
    let h = harness_with(test_config(), objects, store.clone());
    let session = h.service.initiate("settled.bin", 0).await.unwrap();
    h.service
        .accept_part(session.id, 1, Bytes::from_static(b"AAAA"))
        .await
        .unwrap();

    // The replacement lands in the backend right away but is acknowledged late.
    store.ack_delay_ms.store(300, Ordering::SeqCst);
    let service = h.service.clone();
    let id = session.id;
    let replacement =
        tokio::spawn(async move { service.accept_part(id, 1, Bytes::from_static(b"BBBB")).await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let location = h.service.complete(session.id, &[1]).await.unwrap();
    assert_eq!(h.objects.object(&location.key).unwrap(), Bytes::from_static(b"AAAA"));

    let replacement = replacement.await.unwrap();
    assert!(matches!(
        replacement,
        Err(UploadError::SessionClosed {
            status: SessionStatus::Completed,
            ..
        })
    ));
    let stored = h.service.get_session(session.id).await.unwrap();
    assert_eq!(stored.parts[&1].fingerprint, fingerprint(b"AAAA"));
}

#[tokio::test]
async fn test_part_written_after_timeout_is_not_composed() {
    let objects = Arc::new(InMemoryObjectStore::new());
    let store = Arc::new(TestStore::new(objects.clone()));
    let h = harness_with(
        UploadConfig {
            backend_timeout_secs: 1,
            ..test_config()
        },
        objects,
        store.clone(),
    );
    let session = h.service.initiate("late.bin", 0).await.unwrap();
    h.service
        .accept_part(session.id, 1, Bytes::from_static(b"AAAA"))
        .await
        .unwrap();

    store.ack_delay_ms.store(3000, Ordering::SeqCst);
    let err = h
        .service
        .accept_part(session.id, 1, Bytes::from_static(b"BBBB"))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::BackendUnavailable(_)));
    // The late write reached the backend, next to the recorded one.
    assert_eq!(h.objects.stored_versions(&session.handle()), 2);

    let location = h.service.complete(session.id, &[1]).await.unwrap();
    assert_eq!(h.objects.object(&location.key).unwrap(), Bytes::from_static(b"AAAA"));
}

#[tokio::test]
async fn test_composition_gets_a_window_per_part() {
    let objects = Arc::new(InMemoryObjectStore::new());
    let store = Arc::new(TestStore::new(objects.clone()));
    let h = harness_with(
        UploadConfig {
            backend_timeout_secs: 1,
            ..test_config()
        },
        objects,
        store.clone(),
    );
    let session = h.service.initiate("long.bin", 0).await.unwrap();
    for n in 1..=3u32 {
        h.service.accept_part(session.id, n, payload(n as u8, 4)).await.unwrap();
    }

    store.compose_delay_ms.store(1500, Ordering::SeqCst);
    let location = h.service.complete(session.id, &[1, 2, 3]).await.unwrap();
    assert_eq!(location.size, 12);
}

#[tokio::test]
async fn test_sweep_purges_terminal_sessions_behind_idle_ones() {
    let h = harness(UploadConfig {
        sweep_batch_size: 1,
        terminal_retention_secs: 0,
        ..test_config()
    });
    // Older than the finished session, but well within the TTL.
    let idle = h.service.initiate("idle.bin", 0).await.unwrap();
    let finished = h.service.initiate("finished.bin", 0).await.unwrap();
    h.service.abort(finished.id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let report = h.service.expiry_sweep().await.unwrap();
    assert_eq!(report.purged, 1);
    assert_eq!(report.aborted, 0);
    assert!(h.sessions.get(finished.id).await.unwrap().is_none());
    assert_eq!(
        h.service.get_session(idle.id).await.unwrap().status,
        SessionStatus::Open
    );
}
