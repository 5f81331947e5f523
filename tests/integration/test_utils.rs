//! Shared test utilities for integration tests
//!
//! Environment isolation for config tests and a scriptable multipart store for
//! the upload and recorder tests.

use async_trait::async_trait;
use parking_lot::Mutex as PlMutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use studyplayer::error::StoreError;
use studyplayer::upload::{CompletedPart, MemoryStore, MultipartStore, UploadConfig};
use tempfile::TempDir;

/// Global mutex to serialize environment variable access across all tests
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const ISOLATED_VARS: &[&str] = &[
    "HOME",
    "XDG_CONFIG_HOME",
    "STUDYPLAYER_ENV",
    "STUDYPLAYER__UPLOAD__BUCKET",
    "STUDYPLAYER__UPLOAD__ENDPOINT",
    "STUDYPLAYER__PARSER__PLACEHOLDER_POLICY",
];

/// Run `f` with HOME and XDG_CONFIG_HOME pointed into `test_dir` and the
/// STUDYPLAYER variables cleared. The original environment is restored afterwards.
///
/// Returns the config home (`<test_dir>/config-home`) to `f`.
pub fn with_isolated_env<F, R>(test_dir: &TempDir, f: F) -> R
where
    F: FnOnce(&std::path::Path) -> R,
{
    let _guard = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<(&str, Option<String>)> = ISOLATED_VARS
        .iter()
        .map(|name| (*name, std::env::var(name).ok()))
        .collect();

    let config_home = test_dir.path().join("config-home");
    let home = test_dir.path().join("home");
    std::fs::create_dir_all(&config_home).unwrap();
    std::fs::create_dir_all(&home).unwrap();

    for name in ISOLATED_VARS {
        std::env::remove_var(name);
    }
    std::env::set_var("HOME", &home);
    std::env::set_var("XDG_CONFIG_HOME", &config_home);

    let result = f(&config_home);

    for (name, value) in saved {
        match value {
            Some(value) => std::env::set_var(name, value),
            None => std::env::remove_var(name),
        }
    }
    result
}

/// Upload settings with tiny retry delays.
pub fn fast_upload_config(part_size_bytes: usize) -> UploadConfig {
    UploadConfig {
        part_size_bytes,
        retry_delay_ms: 1,
        ..UploadConfig::default()
    }
}

/// Multipart store backed by [`MemoryStore`] whose part uploads can be made to
/// fail transiently or to take a fixed time.
#[derive(Default)]
pub struct ScriptedStore {
    inner: MemoryStore,
    /// Remaining transient failures per part number.
    failures: PlMutex<HashMap<u32, u32>>,
    /// Artificial latency per part number.
    delays: PlMutex<HashMap<u32, Duration>>,
    /// Attempts seen per part number.
    attempts: PlMutex<HashMap<u32, u32>>,
    /// Order in which parts were acknowledged.
    acknowledged: PlMutex<Vec<u32>>,
    create_calls: AtomicU32,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_part(self, part_number: u32, times: u32) -> Self {
        self.failures.lock().insert(part_number, times);
        self
    }

    pub fn delay_part(self, part_number: u32, delay: Duration) -> Self {
        self.delays.lock().insert(part_number, delay);
        self
    }

    pub fn attempts(&self, part_number: u32) -> u32 {
        self.attempts.lock().get(&part_number).copied().unwrap_or(0)
    }

    pub fn acknowledged_order(&self) -> Vec<u32> {
        self.acknowledged.lock().clone()
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl MultipartStore for ScriptedStore {
    async fn create_multipart(&self, key: &str, content_type: &str) -> Result<String, StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.create_multipart(key, content_type).await
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        body: &[u8],
    ) -> Result<String, StoreError> {
        *self.attempts.lock().entry(part_number).or_insert(0) += 1;

        let delay = self.delays.lock().get(&part_number).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.failures.lock();
            if let Some(remaining) = failures.get_mut(&part_number) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(StoreError::Transient(format!(
                        "injected failure for part {}",
                        part_number
                    )));
                }
            }
        }

        let e_tag = self
            .inner
            .upload_part(key, upload_id, part_number, body)
            .await?;
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
