//! Typed recorder events.
//!
//! The event set is closed: handlers register against a [`RecorderEventKind`],
//! and string names are checked when the handler is registered.

use crate::error::RecorderError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecorderEventKind {
    Installed,
    Started,
    Paused,
    Resumed,
    Stopped,
    UploadCompleted,
    UploadFailed,
    Destroyed,
}

impl RecorderEventKind {
    pub const ALL: [RecorderEventKind; 8] = [
        RecorderEventKind::Installed,
        RecorderEventKind::Started,
        RecorderEventKind::Paused,
        RecorderEventKind::Resumed,
        RecorderEventKind::Stopped,
        RecorderEventKind::UploadCompleted,
        RecorderEventKind::UploadFailed,
        RecorderEventKind::Destroyed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecorderEventKind::Installed => "installed",
            RecorderEventKind::Started => "started",
            RecorderEventKind::Paused => "paused",
            RecorderEventKind::Resumed => "resumed",
            RecorderEventKind::Stopped => "stopped",
            RecorderEventKind::UploadCompleted => "upload-completed",
            RecorderEventKind::UploadFailed => "upload-failed",
            RecorderEventKind::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for RecorderEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecorderEventKind {
    type Err = RecorderError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| RecorderError::UnknownEvent(name.to_string()))
    }
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RecorderEvent {
    Installed {
        camera_id: Option<String>,
        microphone_id: Option<String>,
    },
    Started {
        video_id: String,
        at: DateTime<Utc>,
    },
    Paused {
        at_seconds: f64,
    },
    Resumed {
        at_seconds: f64,
    },
    Stopped {
        video_id: String,
        duration_seconds: f64,
    },
    UploadCompleted {
        key: String,
        parts: usize,
        total_bytes: usize,
    },
    UploadFailed {
        video_id: String,
        error: String,
    },
    Destroyed,
}

impl RecorderEvent {
    pub fn kind(&self) -> RecorderEventKind {
        match self {
            RecorderEvent::Installed { .. } => RecorderEventKind::Installed,
            RecorderEvent::Started { .. } => RecorderEventKind::Started,
            RecorderEvent::Paused { .. } => RecorderEventKind::Paused,
            RecorderEvent::Resumed { .. } => RecorderEventKind::Resumed,
            RecorderEvent::Stopped { .. } => RecorderEventKind::Stopped,
            RecorderEvent::UploadCompleted { .. } => RecorderEventKind::UploadCompleted,
            RecorderEvent::UploadFailed { .. } => RecorderEventKind::UploadFailed,
            RecorderEvent::Destroyed => RecorderEventKind::Destroyed,
        }
    }
}

type Handler = Box<dyn Fn(&RecorderEvent) + Send + Sync>;

/// Event emitter
#[derive(Default)]
pub struct EventEmitter {
    handlers: Vec<(RecorderEventKind, Handler)>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, kind: RecorderEventKind, handler: F)
    where
        F: Fn(&RecorderEvent) + Send + Sync + 'static,
    {
        self.handlers.push((kind, Box::new(handler)));
    }

    /// Register by name; unknown names are rejected here rather than at emit time.
    pub fn on_named<F>(&mut self, name: &str, handler: F) -> Result<(), RecorderError>
    where
        F: Fn(&RecorderEvent) + Send + Sync + 'static,
    {
        let kind: RecorderEventKind = name.parse()?;
        self.on(kind, handler);
        Ok(())
    }

    pub fn emit(&self, event: &RecorderEvent) {
        let kind = event.kind();
        debug!(event = %kind, "Recorder event");
        for (registered, handler) in &self.handlers {
            if *registered == kind {
                handler(event);
            }
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
