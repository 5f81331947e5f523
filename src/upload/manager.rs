//! Upload manager: the single owner of one recording's multipart session.
//!
//! Parts are numbered at flush time and uploaded as independent tasks that may
//! finish in any order. Completion waits for every task to settle, then submits
//! the acknowledged parts in ascending part-number order.

use super::{
    video_object_key, CompletedPart, MultipartStore, RetryPolicy, UploadConfig, UploadPart,
    UploadSession, VIDEO_CONTENT_TYPE,
};
use crate::error::{StoreError, UploadError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Per-part progress, independent of capture timing.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PartState {
    InFlight { size: usize },
    Uploaded { size: usize, e_tag: String },
    Failed { size: usize, error: UploadError },
}

impl PartState {
    fn size(&self) -> usize {
        match self {
            PartState::InFlight { size }
            | PartState::Uploaded { size, .. }
            | PartState::Failed { size, .. } => *size,
        }
    }
}

type PartTable = Arc<Mutex<BTreeMap<u32, PartState>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Idle,
    Open { upload_id: String },
    Failed(UploadError),
    Completed,
}

/// Result of a finalized upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedUpload {
    pub key: String,
    pub upload_id: String,
    pub parts: Vec<CompletedPart>,
    pub total_bytes: usize,
}

/// Run `operation` until it succeeds, fails permanently, or the attempt budget
/// is spent. Returns the attempt count alongside the outcome.
pub async fn retry_transient<F, Fut, T>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> (u32, Result<T, StoreError>)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return (attempt, Ok(value));
            }
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient storage failure, retrying"
                );
                sleep(delay).await;
            }
            Err(err) => return (attempt, Err(err)),
        }
    }
}

/// Send one part with the retry budget, mapping exhaustion to a fatal error.
async fn send_part(
    store: Arc<dyn MultipartStore>,
    key: String,
    upload_id: String,
    part_number: u32,
    body: Vec<u8>,
    policy: RetryPolicy,
) -> Result<String, UploadError> {
    let label = format!("upload part {}", part_number);
    let (attempts, result) = retry_transient(&label, policy, || {
        store.upload_part(&key, &upload_id, part_number, &body)
    })
    .await;

    result.map_err(|err| {
        error!(
            key = %key,
            part_number,
            attempts,
            error = %err,
            "Part upload failed permanently"
        );
        UploadError::Fatal {
            part_number,
            attempts,
            reason: err.to_string(),
        }
    })
}

/// Chunked upload manager
pub struct UploadManager {
    store: Arc<dyn MultipartStore>,
    key: String,
    part_size: usize,
    policy: RetryPolicy,
    state: SessionState,
    pending: Vec<u8>,
    next_part_number: u32,
    parts: PartTable,
    tasks: JoinSet<()>,
}

impl UploadManager {
    /// Manager for `<videoFilename>.webm`. Nothing is sent until `create_upload`.
    pub fn new(
        store: Arc<dyn MultipartStore>,
        config: &UploadConfig,
        video_filename: &str,
    ) -> Self {
        Self {
            store,
            key: video_object_key(video_filename),
            part_size: config.part_size_bytes.max(1),
            policy: config.retry_policy(),
            state: SessionState::Idle,
            pending: Vec::new(),
            next_part_number: 1,
            parts: Arc::new(Mutex::new(BTreeMap::new())),
            tasks: JoinSet::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Allocate the storage-side multipart session.
    pub async fn create_upload(&mut self) -> Result<UploadSession, UploadError> {
        match &self.state {
            SessionState::Idle => {}
            SessionState::Open { .. } => return self.session(),
            SessionState::Failed(err) => return Err(err.clone()),
            SessionState::Completed => return Err(UploadError::SessionFailed),
        }
        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        let (_, result) = retry_transient("create multipart upload", self.policy, || {
            store.create_multipart(&key, VIDEO_CONTENT_TYPE)
        })
        .await;
        let upload_id = result.map_err(|err| UploadError::CreateFailed(err.to_string()))?;

        info!(key = %self.key, upload_id = %upload_id, "Multipart upload created");
        self.state = SessionState::Open { upload_id };
        self.session()
    }

    /// Current session snapshot.
    pub fn session(&self) -> Result<UploadSession, UploadError> {
        let upload_id = match &self.state {
            SessionState::Open { upload_id } => upload_id.clone(),
            SessionState::Failed(err) => return Err(err.clone()),
            SessionState::Idle | SessionState::Completed => return Err(UploadError::NotStarted),
        };
        let parts = self
            .parts
            .lock()
            .iter()
            .map(|(&part_number, state)| UploadPart {
                part_number,
                size: state.size(),
                e_tag: match state {
                    PartState::Uploaded { e_tag, .. } => Some(e_tag.clone()),
                    _ => None,
                },
            })
            .collect();
        Ok(UploadSession {
            key: self.key.clone(),
            upload_id,
            parts,
            pending_bytes: self.pending.len(),
        })
    }

    /// Number of parts flushed so far.
    pub fn parts_submitted(&self) -> u32 {
        self.next_part_number - 1
    }

    /// Append a chunk; flush a part once the buffer reaches the part size.
    pub async fn on_data_available(&mut self, chunk: &[u8]) -> Result<(), UploadError> {
        self.ensure_healthy().await?;
        self.open_upload_id()?;
        if chunk.is_empty() {
            return Ok(());
        }
        self.pending.extend_from_slice(chunk);
        if self.pending.len() >= self.part_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Upload one part in the foreground and wait for its acknowledgment.
    pub async fn upload_part(
        &mut self,
        buffer: Vec<u8>,
        part_number: u32,
    ) -> Result<UploadPart, UploadError> {
        let upload_id = self.open_upload_id()?;
        let size = buffer.len();
        let e_tag = send_part(
            Arc::clone(&self.store),
            self.key.clone(),
            upload_id,
            part_number,
            buffer,
            self.policy,
        )
        .await?;
        Ok(UploadPart {
            part_number,
            size,
            e_tag: Some(e_tag),
        })
    }

    /// Flush the remaining buffer, wait for every part, and finalize.
    ///
    /// The chunk stream must have ended before this is called.
    pub async fn complete_upload(&mut self) -> Result<CompletedUpload, UploadError> {
        self.ensure_healthy().await?;
        let upload_id = self.open_upload_id()?;

        if !self.pending.is_empty() {
            self.flush()?;
        }

        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                error!(key = %self.key, error = %err, "Part upload task did not finish");
            }
        }

        let (parts, total_bytes) = match self.acknowledged_parts() {
            Ok(acknowledged) => acknowledged,
            Err(err) => {
                self.fail(err.clone()).await;
                return Err(err);
            }
        };
        if parts.is_empty() {
            let err = UploadError::CompletionRejected("no data was recorded".to_string());
            self.fail(err.clone()).await;
            return Err(err);
        }

        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        let (_, result) = retry_transient("complete multipart upload", self.policy, || {
            store.complete_multipart(&key, &upload_id, &parts)
        })
        .await;
        if let Err(err) = result {
            let err = UploadError::CompletionRejected(err.to_string());
            self.fail(err.clone()).await;
            return Err(err);
        }

        info!(
            key = %self.key,
            upload_id = %upload_id,
            parts = parts.len(),
            total_bytes,
            "Multipart upload completed"
        );
        self.state = SessionState::Completed;
        Ok(CompletedUpload {
            key: self.key.clone(),
            upload_id,
            parts,
            total_bytes,
        })
    }

    /// Cancel outstanding parts and discard the storage-side session.
    pub async fn abort(&mut self) -> Result<(), UploadError> {
        let upload_id = match &self.state {
            SessionState::Open { upload_id } => upload_id.clone(),
            _ => return Ok(()),
        };
        self.tasks.abort_all();
        self.pending.clear();
        self.state = SessionState::Failed(UploadError::SessionFailed);
        self.store
            .abort_multipart(&self.key, &upload_id)
            .await
            .map_err(|err| UploadError::AbortFailed(err.to_string()))
    }

    fn open_upload_id(&self) -> Result<String, UploadError> {
        match &self.state {
            SessionState::Open { upload_id } => Ok(upload_id.clone()),
            SessionState::Failed(err) => Err(err.clone()),
            SessionState::Idle | SessionState::Completed => Err(UploadError::NotStarted),
        }
    }

    /// Reject further work once any part has failed permanently.
    async fn ensure_healthy(&mut self) -> Result<(), UploadError> {
        if let SessionState::Failed(err) = &self.state {
            return Err(err.clone());
        }
        let failure = self.parts.lock().values().find_map(|state| match state {
            PartState::Failed { error, .. } => Some(error.clone()),
            _ => None,
        });
        if let Some(err) = failure {
            self.fail(err.clone()).await;
            return Err(err);
        }
        Ok(())
    }

    /// Hand the buffered bytes to a new part task.
    fn flush(&mut self) -> Result<(), UploadError> {
        let upload_id = self.open_upload_id()?;
        let body = std::mem::take(&mut self.pending);
        let part_number = self.next_part_number;
        self.next_part_number += 1;
        let size = body.len();

        debug!(key = %self.key, part_number, size, "Flushing part");
        self.parts
            .lock()
            .insert(part_number, PartState::InFlight { size });

        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        let policy = self.policy;
        let parts = Arc::clone(&self.parts);
        self.tasks.spawn(async move {
            let outcome = send_part(store, key, upload_id, part_number, body, policy).await;
            let state = match outcome {
                Ok(e_tag) => PartState::Uploaded { size, e_tag },
                Err(error) => PartState::Failed { size, error },
            };
            parts.lock().insert(part_number, state);
        });
        Ok(())
    }

    /// Ordered `{partNumber, eTag}` list, or the first failure.
    fn acknowledged_parts(&self) -> Result<(Vec<CompletedPart>, usize), UploadError> {
        let table = self.parts.lock();
        let mut parts = Vec::with_capacity(table.len());
        let mut total_bytes = 0;
        for (expected, (&part_number, state)) in (1u32..).zip(table.iter()) {
            if part_number != expected {
                return Err(UploadError::Fatal {
                    part_number: expected,
                    attempts: 0,
                    reason: "part was never submitted".to_string(),
                });
            }
            match state {
                PartState::Uploaded { size, e_tag } => {
                    total_bytes += size;
                    parts.push(CompletedPart {
                        part_number,
                        e_tag: e_tag.clone(),
                    });
                }
                PartState::Failed { error, .. } => return Err(error.clone()),
                PartState::InFlight { .. } => {
                    return Err(UploadError::Fatal {
                        part_number,
                        attempts: 0,
                        reason: "part upload never settled".to_string(),
                    })
                }
            }
        }
        Ok((parts, total_bytes))
    }

    /// Mark the session failed and abort it on the store, best effort.
    async fn fail(&mut self, err: UploadError) {
        self.tasks.abort_all();
        self.pending.clear();
        if let SessionState::Open { upload_id } = &self.state {
            if let Err(abort_err) = self.store.abort_multipart(&self.key, upload_id).await {
                warn!(key = %self.key, error = %abort_err, "Failed to abort multipart upload");
            }
        }
        self.state = SessionState::Failed(err);
    }
}
