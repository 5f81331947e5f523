//! Preferred capture devices for one study session.
//!
//! Owned by whatever constructs recorders for the session and handed to each
//! of them; lives as long as that owner does.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceChoice {
    pub camera_id: Option<String>,
    pub microphone_id: Option<String>,
}

/// Shared handle to the session's device preference.
#[derive(Debug, Clone, Default)]
pub struct PreferredDevices {
    inner: Arc<RwLock<DeviceChoice>>,
}

impl PreferredDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> DeviceChoice {
        self.inner.read().clone()
    }

    pub fn set(&self, choice: DeviceChoice) {
        *self.inner.write() = choice;
    }

    pub fn set_camera(&self, camera_id: impl Into<String>) {
        self.inner.write().camera_id = Some(camera_id.into());
    }

    pub fn set_microphone(&self, microphone_id: impl Into<String>) {
        self.inner.write().microphone_id = Some(microphone_id.into());
    }

    pub fn clear(&self) {
        self.set(DeviceChoice::default());
    }
}
