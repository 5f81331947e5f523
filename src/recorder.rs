//! Video Recording Session
//!
//! Drives the media-capture lifecycle (install, start, pause, resume, stop,
//! destroy) and pumps captured chunks into an [`UploadManager`]. The pump owns
//! the manager; the upload is completed only after the capture's chunk stream
//! has ended, so no chunk can race the final flush.

use crate::error::{RecorderError, UploadError};
use crate::upload::{CompletedUpload, MultipartStore, UploadConfig, UploadManager};
use async_trait::async_trait;
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub mod devices;
pub mod events;

pub use devices::{DeviceChoice, PreferredDevices};
pub use events::{EventEmitter, RecorderEvent, RecorderEventKind};

/// Ordered binary chunks from the capture device. Ends after `stop`.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// External media-capture collaborator.
#[async_trait]
pub trait MediaCapture: Send {
    /// Acquire camera and microphone, preferring `preferred`; returns what was opened.
    async fn install(&mut self, preferred: &DeviceChoice) -> Result<DeviceChoice, RecorderError>;

    /// Begin capturing, emitting one chunk per `timeslice`.
    async fn start(&mut self, timeslice: Duration) -> Result<ChunkStream, RecorderError>;

    async fn pause(&mut self) -> Result<(), RecorderError>;

    async fn resume(&mut self) -> Result<(), RecorderError>;

    /// Stop capturing. The final chunk is delivered before the stream ends.
    async fn stop(&mut self) -> Result<(), RecorderError>;

    /// Release the devices.
    async fn release(&mut self);
}

/// Recorder settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Chunk granularity requested from the capture device.
    #[serde(default = "default_timeslice_ms")]
    pub timeslice_ms: u64,

    /// How long `stop` waits for the upload before giving up.
    #[serde(default = "default_upload_timeout_ms")]
    pub upload_timeout_ms: u64,
}

fn default_timeslice_ms() -> u64 {
    1000
}

fn default_upload_timeout_ms() -> u64 {
    30_000
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            timeslice_ms: default_timeslice_ms(),
            upload_timeout_ms: default_upload_timeout_ms(),
        }
    }
}

impl RecorderConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.timeslice_ms == 0 {
            return Err("timeslice_ms must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Uninitialized,
    Installed,
    Recording,
    Paused,
    Stopped,
    Destroyed,
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecorderState::Uninitialized => "uninitialized",
            RecorderState::Installed => "installed",
            RecorderState::Recording => "recording",
            RecorderState::Paused => "paused",
            RecorderState::Stopped => "stopped",
            RecorderState::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Recording time, excluding paused spans.
#[derive(Debug, Default)]
struct RecordingClock {
    started: Option<Instant>,
    paused_at: Option<Instant>,
    paused_total: Duration,
    stopped_at: Option<Instant>,
}

impl RecordingClock {
    fn start(&mut self) {
        *self = Self {
            started: Some(Instant::now()),
            ..Self::default()
        };
    }

    fn pause(&mut self) {
        self.paused_at.get_or_insert_with(Instant::now);
    }

    fn resume(&mut self) {
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += paused_at.elapsed();
        }
    }

    fn stop(&mut self) {
        self.resume();
        self.stopped_at = Some(Instant::now());
    }

    fn seconds(&self) -> Option<f64> {
        let started = self.started?;
        let end = self.stopped_at.or(self.paused_at).unwrap_or_else(Instant::now);
        Some(
            end.saturating_duration_since(started)
                .saturating_sub(self.paused_total)
                .as_secs_f64(),
        )
    }
}

type UploadTask = JoinHandle<Result<CompletedUpload, UploadError>>;

/// Video recorder
pub struct VideoRecorder<C: MediaCapture> {
    capture: C,
    store: Arc<dyn MultipartStore>,
    upload_config: UploadConfig,
    config: RecorderConfig,
    devices: PreferredDevices,
    events: EventEmitter,
    state: RecorderState,
    video_id: Option<String>,
    upload: Option<UploadTask>,
    clock: RecordingClock,
}

impl<C: MediaCapture> VideoRecorder<C> {
    pub fn new(
        capture: C,
        store: Arc<dyn MultipartStore>,
        upload_config: UploadConfig,
        config: RecorderConfig,
        devices: PreferredDevices,
    ) -> Self {
        Self {
            capture,
            store,
            upload_config,
            config,
            devices,
            events: EventEmitter::new(),
            state: RecorderState::Uninitialized,
            video_id: None,
            upload: None,
            clock: RecordingClock::default(),
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn video_id(&self) -> Option<&str> {
        self.video_id.as_deref()
    }

    pub fn events_mut(&mut self) -> &mut EventEmitter {
        &mut self.events
    }

    /// Seconds recorded so far, excluding pauses. `None` before the first start.
    pub fn current_time(&self) -> Option<f64> {
        self.clock.seconds()
    }

    fn transition_error(&self, action: &str) -> RecorderError {
        RecorderError::InvalidTransition {
            state: self.state.to_string(),
            action: action.to_string(),
        }
    }

    /// Open the capture devices.
    pub async fn install(&mut self) -> Result<DeviceChoice, RecorderError> {
        if self.state != RecorderState::Uninitialized {
            return Err(self.transition_error("install"));
        }
        let chosen = self.capture.install(&self.devices.get()).await?;
        self.devices.set(chosen.clone());
        self.state = RecorderState::Installed;
        info!(camera = ?chosen.camera_id, microphone = ?chosen.microphone_id, "Recorder installed");
        self.events.emit(&RecorderEvent::Installed {
            camera_id: chosen.camera_id.clone(),
            microphone_id: chosen.microphone_id.clone(),
        });
        Ok(chosen)
    }

    /// Start recording into `<video_filename>.webm`.
    pub async fn start(&mut self, video_filename: &str) -> Result<(), RecorderError> {
        if !matches!(self.state, RecorderState::Installed | RecorderState::Stopped) {
            return Err(self.transition_error("start"));
        }

        let mut manager =
            UploadManager::new(Arc::clone(&self.store), &self.upload_config, video_filename);
        manager.create_upload().await?;

        let mut chunks = match self.capture.start(self.config.timeslice()).await {
            Ok(chunks) => chunks,
            Err(err) => {
                if let Err(abort_err) = manager.abort().await {
                    warn!(error = %abort_err, "Failed to abort upload after capture error");
                }
                return Err(err);
            }
        };

        let pump: UploadTask = tokio::spawn(async move {
            while let Some(chunk) = chunks.next().await {
                if let Err(err) = manager.on_data_available(&chunk).await {
                    return Err(err);
                }
            }
            manager.complete_upload().await
        });
        self.upload = Some(pump);

        self.video_id = Some(video_filename.to_string());
        self.clock.start();
        self.state = RecorderState::Recording;
        info!(video_id = %video_filename, "Recording started");
        self.events.emit(&RecorderEvent::Started {
            video_id: video_filename.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    pub async fn pause(&mut self) -> Result<(), RecorderError> {
        if self.state != RecorderState::Recording {
            return Err(self.transition_error("pause"));
        }
        self.capture.pause().await?;
        self.clock.pause();
        self.state = RecorderState::Paused;
        self.events.emit(&RecorderEvent::Paused {
            at_seconds: self.current_time().unwrap_or_default(),
        });
        Ok(())
    }

    pub async fn resume(&mut self) -> Result<(), RecorderError> {
        if self.state != RecorderState::Paused {
            return Err(self.transition_error("resume"));
        }
        self.capture.resume().await?;
        self.clock.resume();
        self.state = RecorderState::Recording;
        self.events.emit(&RecorderEvent::Resumed {
            at_seconds: self.current_time().unwrap_or_default(),
        });
        Ok(())
    }

    /// Stop recording and wait, up to the configured timeout, for the upload.
    ///
    /// On timeout the upload keeps running in the background; only the wait
    /// is abandoned.
    pub async fn stop(&mut self) -> Result<CompletedUpload, RecorderError> {
        if !matches!(self.state, RecorderState::Recording | RecorderState::Paused) {
            return Err(self.transition_error("stop"));
        }
        self.capture.stop().await?;
        self.clock.stop();
        self.state = RecorderState::Stopped;

        let video_id = self.video_id.clone().unwrap_or_default();
        self.events.emit(&RecorderEvent::Stopped {
            video_id: video_id.clone(),
            duration_seconds: self.current_time().unwrap_or_default(),
        });

        let mut upload = self.upload.take().ok_or(UploadError::NotStarted)?;
        let timeout = self.config.upload_timeout();
        let outcome = match tokio::time::timeout(timeout, &mut upload).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(UploadError::Fatal {
                part_number: 0,
                attempts: 0,
                reason: format!("upload task ended abnormally: {}", join_err),
            }),
            Err(_) => {
                warn!(
                    video_id = %video_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Gave up waiting for upload"
                );
                Err(UploadError::Timeout(timeout))
            }
        };

        match outcome {
            Ok(completed) => {
                self.events.emit(&RecorderEvent::UploadCompleted {
                    key: completed.key.clone(),
                    parts: completed.parts.len(),
                    total_bytes: completed.total_bytes,
                });
                Ok(completed)
            }
            Err(err) => {
                error!(video_id = %video_id, error = %err, "Recording upload failed");
                self.events.emit(&RecorderEvent::UploadFailed {
                    video_id,
                    error: err.to_string(),
                });
                Err(RecorderError::Upload(err))
            }
        }
    }

    /// Tear down from any state. An active recording is stopped and its upload
    /// left to finish in the background.
    pub async fn destroy(&mut self) -> Result<(), RecorderError> {
        if self.state == RecorderState::Destroyed {
            return Ok(());
        }
        if matches!(self.state, RecorderState::Recording | RecorderState::Paused) {
            self.capture.stop().await?;
            self.clock.stop();
            if self.upload.take().is_some() {
                info!(video_id = ?self.video_id, "Upload continues after recorder destroyed");
            }
        }
        self.capture.release().await;
        self.state = RecorderState::Destroyed;
        self.events.emit(&RecorderEvent::Destroyed);
        Ok(())
    }
}
