//! Integration tests for the chunked multipart upload pipeline

use crate::integration::test_utils::{fast_upload_config, ScriptedStore};
use std::sync::Arc;
use std::time::Duration;
use studyplayer::error::UploadError;
use studyplayer::upload::{
    MemoryStore, MultipartStore, UploadConfig, UploadManager, DEFAULT_PART_SIZE,
};

const MIB: usize = 1024 * 1024;

#[tokio::test]
async fn test_parts_flush_at_threshold() {
    let store = Arc::new(MemoryStore::new());
    let mut manager = UploadManager::new(store.clone(), &UploadConfig::default(), "videoStream_d");
    manager.create_upload().await.unwrap();

    manager.on_data_available(&vec![1u8; 3 * MIB]).await.unwrap();
    assert_eq!(manager.parts_submitted(), 0);

    // 6 MiB buffered crosses the 5 MiB threshold.
    manager.on_data_available(&vec![2u8; 3 * MIB]).await.unwrap();
    assert_eq!(manager.parts_submitted(), 1);

    manager.on_data_available(&vec![3u8; MIB]).await.unwrap();
    assert_eq!(manager.parts_submitted(), 1);
    assert_eq!(manager.session().unwrap().pending_bytes, MIB);

    let completed = manager.complete_upload().await.unwrap();
    assert_eq!(manager_part_numbers(&completed), vec![1, 2]);
    assert_eq!(completed.total_bytes, 7 * MIB);

    let object = store.object("videoStream_d.webm").unwrap();
    assert_eq!(object.len(), 7 * MIB);
    assert_eq!(object[0], 1);
    assert_eq!(object[3 * MIB], 2);
    assert_eq!(object[6 * MIB], 3);
    assert_eq!(DEFAULT_PART_SIZE, 5 * MIB);
}

fn manager_part_numbers(completed: &studyplayer::upload::CompletedUpload) -> Vec<u32> {
    completed.parts.iter().map(|p| p.part_number).collect()
}

#[tokio::test]
async fn test_part_succeeds_on_third_attempt() {
    let store = Arc::new(ScriptedStore::new().fail_part(1, 2));
    let mut manager = UploadManager::new(store.clone(), &fast_upload_config(4), "videoStream_e");
    manager.create_upload().await.unwrap();

    let part = manager.upload_part(b"abcd".to_vec(), 1).await.unwrap();
    assert_eq!(store.attempts(1), 3);
    assert_eq!(part.part_number, 1);
    assert_eq!(part.size, 4);

    // The ETag is the one returned by the successful third attempt.
    let reference = MemoryStore::new();
    let upload_id = reference.create_multipart("ref.webm", "video/webm").await.unwrap();
    let expected = reference
        .upload_part("ref.webm", &upload_id, 1, b"abcd")
        .await
        .unwrap();
    assert_eq!(part.e_tag, Some(expected));
}

#[tokio::test]
async fn test_retried_part_is_used_in_completion() {
    let store = Arc::new(ScriptedStore::new().fail_part(2, 2));
    let mut manager = UploadManager::new(store.clone(), &fast_upload_config(4), "videoStream_e");
    manager.create_upload().await.unwrap();

    manager.on_data_available(b"aaaa").await.unwrap();
    manager.on_data_available(b"bbbb").await.unwrap();
    let completed = manager.complete_upload().await.unwrap();

    assert_eq!(store.attempts(2), 3);
    assert_eq!(manager_part_numbers(&completed), vec![1, 2]);
    assert_eq!(
        store.memory().object("videoStream_e.webm"),
        Some(b"aaaabbbb".to_vec())
    );
}

#[tokio::test]
async fn test_exhausted_part_fails_completion_and_aborts() {
    let store = Arc::new(ScriptedStore::new().fail_part(1, 3));
    let mut manager = UploadManager::new(store.clone(), &fast_upload_config(4), "videoStream_e");
    manager.create_upload().await.unwrap();

    manager.on_data_available(b"aaaa").await.unwrap();
    let err = manager.complete_upload().await.unwrap_err();

    assert!(err.is_fatal(), "expected fatal error, got {:?}", err);
    match err {
        UploadError::Fatal {
            part_number,
            attempts,
            ..
        } => {
            assert_eq!(part_number, 1);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(store.attempts(1), 3);
    assert_eq!(store.memory().aborted_uploads(), 1);
    assert!(store.memory().object("videoStream_e.webm").is_none());
    assert!(store.memory().completion_calls().is_empty());
}

#[tokio::test]
async fn test_submission_after_fatal_part_is_rejected() {
    let store = Arc::new(ScriptedStore::new().fail_part(1, 3));
    let mut manager = UploadManager::new(store.clone(), &fast_upload_config(4), "videoStream_e");
    manager.create_upload().await.unwrap();
    manager.on_data_available(b"aaaa").await.unwrap();

    // Let the background part exhaust its budget.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let err = manager.on_data_available(b"bbbb").await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(store.memory().aborted_uploads(), 1);
    // The session stays failed.
    assert!(manager.complete_upload().await.is_err());
}

#[tokio::test]
async fn test_out_of_order_acknowledgments_complete_in_order() {
    let store = Arc::new(
        ScriptedStore::new()
            .delay_part(1, Duration::from_millis(60))
            .delay_part(2, Duration::from_millis(30)),
    );
    let mut manager = UploadManager::new(store.clone(), &fast_upload_config(2), "videoStream_p5");
    manager.create_upload().await.unwrap();

    for chunk in [b"11", b"22", b"33"] {
        manager.on_data_available(chunk).await.unwrap();
    }
    let completed = manager.complete_upload().await.unwrap();

    assert_eq!(store.acknowledged_order(), vec![3, 2, 1]);
    assert_eq!(manager_part_numbers(&completed), vec![1, 2, 3]);
    let calls = store.memory().completion_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0].iter().map(|p| p.part_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(
        store.memory().object("videoStream_p5.webm"),
        Some(b"112233".to_vec())
    );
}

#[tokio::test]
async fn test_data_before_create_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let mut manager = UploadManager::new(store, &UploadConfig::default(), "videoStream_x");
    let err = manager.on_data_available(b"data").await.unwrap_err();
    assert_eq!(err, UploadError::NotStarted);
}

#[tokio::test]
async fn test_empty_recording_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let mut manager = UploadManager::new(store.clone(), &UploadConfig::default(), "videoStream_x");
    manager.create_upload().await.unwrap();
    manager.on_data_available(&[]).await.unwrap();

    let err = manager.complete_upload().await.unwrap_err();
    assert!(matches!(err, UploadError::CompletionRejected(_)));
    assert_eq!(store.aborted_uploads(), 1);
}

#[tokio::test]
async fn test_abort_discards_session() {
    let store = Arc::new(MemoryStore::new());
    let mut manager = UploadManager::new(store.clone(), &fast_upload_config(4), "videoStream_x");
    manager.create_upload().await.unwrap();
    manager.on_data_available(b"abcdef").await.unwrap();

    manager.abort().await.unwrap();
    assert_eq!(store.aborted_uploads(), 1);
    assert!(manager.on_data_available(b"more").await.is_err());
}
