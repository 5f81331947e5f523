//! Property-based tests for multipart part ordering

use async_trait::async_trait;
use parking_lot::Mutex;
use proptest::prelude::*;
use proptest::test_runner::{Config, TestRunner};
use std::sync::Arc;
use std::time::Duration;
use studyplayer::error::StoreError;
use studyplayer::upload::{CompletedPart, MemoryStore, MultipartStore, UploadConfig, UploadManager};

/// Memory store whose part uploads take a per-part latency.
struct JitteryStore {
    inner: MemoryStore,
    delays_ms: Vec<u64>,
    acknowledged: Mutex<Vec<u32>>,
}

#[async_trait]
impl MultipartStore for JitteryStore {
    async fn create_multipart(&self, key: &str, content_type: &str) -> Result<String, StoreError> {
        self.inner.create_multipart(key, content_type).await
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: &[u8],
    ) -> Result<String, StoreError> {
        let delay = self
            .delays_ms
            .get(part_number as usize - 1)
            .copied()
            .unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        let e_tag = self.inner.upload_part(key, upload_id, part_number, body).await?;
        self.acknowledged.lock().push(part_number);
        Ok(e_tag)
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<(), StoreError> {
        self.inner.complete_multipart(key, upload_id, parts).await
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<(), StoreError> {
        self.inner.abort_multipart(key, upload_id).await
    }
}

/// Completion submits parts 1..N in order regardless of acknowledgment order.
#[test]
fn test_completion_part_list_is_ordered_for_any_interleaving() {
    let mut runner = TestRunner::new(Config {
        cases: 24,
        ..Config::default()
    });

    runner
        .run(
            &(
                prop::collection::vec(0u64..15, 1..8),
                prop::collection::vec(1usize..12, 1..12),
            ),
            |(delays_ms, chunk_sizes)| {
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .enable_time()
                    .build()
                    .unwrap();
                let (parts, expected_parts, object, expected_bytes) = rt.block_on(async {
                    let store = Arc::new(JitteryStore {
                        inner: MemoryStore::new(),
                        delays_ms,
                        acknowledged: Mutex::new(Vec::new()),
                    });
                    let config = UploadConfig {
                        part_size_bytes: 8,
                        ..UploadConfig::default()
                    };
                    let mut manager =
                        UploadManager::new(store.clone(), &config, "videoStream_prop");
                    manager.create_upload().await.unwrap();

                    let mut expected_bytes = Vec::new();
                    for (i, size) in chunk_sizes.iter().enumerate() {
                        let chunk = vec![i as u8; *size];
                        expected_bytes.extend_from_slice(&chunk);
                        manager.on_data_available(&chunk).await.unwrap();
                    }
                    let expected_parts = manager.parts_submitted()
                        + u32::from(manager.session().unwrap().pending_bytes > 0);
                    manager.complete_upload().await.unwrap();

                    let calls = store.inner.completion_calls();
                    let parts: Vec<u32> = calls[0].iter().map(|p| p.part_number).collect();
                    let object = store.inner.object("videoStream_prop.webm").unwrap();
                    (parts, expected_parts, object, expected_bytes)
                });

                prop_assert_eq!(parts, (1..=expected_parts).collect::<Vec<_>>());
                prop_assert_eq!(object, expected_bytes);
                Ok(())
            },
        )
        .unwrap();
}
