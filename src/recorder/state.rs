//! Session state and configuration
//!
//! Defines the session state machine and the persisted capture configuration.

use crate::capture::traits::{AudioOutputConfig, Resolution};
use crate::project::bundle::default_recordings_root;
use crate::project::schema::{CameraType, EventKind};
use crate::utils::error::{CaptureError, CaptureResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// NVIDIA encoders refuse more concurrent streams than this on most GPUs
pub const MAX_NVIDIA_STREAMS: usize = 3;

/// Current state of the session timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session has run yet
    #[default]
    Idle,
    /// Recording
    Running,
    /// Last session finalized and archived
    Stopped,
}

fn default_frame_rate() -> f64 {
    30.0
}

fn default_true() -> bool {
    true
}

/// Persisted settings of one capture camera
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraSettings {
    /// Stable UUID; generated once and kept across edits
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub camera_type: CameraType,

    #[serde(default)]
    pub resolution: Resolution,

    #[serde(default = "default_frame_rate")]
    pub frame_rate: f64,

    /// Event kinds this camera is subscribed to
    #[serde(default)]
    pub watched_events: Vec<EventKind>,
}

impl CameraSettings {
    /// New settings with a freshly generated id
    pub fn new(name: impl Into<String>) -> Self {
        let mut settings = Self {
            id: String::new(),
            name: name.into(),
            camera_type: CameraType::default(),
            resolution: Resolution::default(),
            frame_rate: default_frame_rate(),
            watched_events: Vec::new(),
        };
        settings.ensure_id();
        settings
    }

    pub fn with_type(mut self, camera_type: CameraType) -> Self {
        self.camera_type = camera_type;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn watching(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.watched_events.extend(kinds);
        self
    }

    /// Generate an id if none is set. Returns true when one was generated.
    pub fn ensure_id(&mut self) -> bool {
        if self.id.trim().is_empty() {
            self.id = Uuid::new_v4().to_string();
            true
        } else {
            false
        }
    }
}

/// Configuration for the session timeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    #[serde(default)]
    pub partner_id: String,

    #[serde(default)]
    pub platform_id: String,

    #[serde(default)]
    pub user_id: String,

    /// Parent directory of every session directory
    #[serde(default = "default_recordings_root")]
    pub recordings_root: PathBuf,

    #[serde(default = "default_true")]
    pub allow_nvidia_encoding: bool,

    /// Reported graphics vendor, used to pick encoder presets
    #[serde(default)]
    pub gpu_vendor: String,

    /// Output audio configuration; `None` means no audio source
    #[serde(default)]
    pub audio: Option<AudioOutputConfig>,

    #[serde(default)]
    pub cameras: Vec<CameraSettings>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            partner_id: String::new(),
            platform_id: String::new(),
            user_id: String::new(),
            recordings_root: default_recordings_root(),
            allow_nvidia_encoding: true,
            gpu_vendor: String::new(),
            audio: None,
            cameras: Vec::new(),
        }
    }
}

impl CaptureConfig {
    /// Load from a JSON file, generating ids for cameras that lack one
    pub fn load(path: &Path) -> CaptureResult<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: CaptureConfig = serde_json::from_str(&content)?;

        let mut generated = 0;
        for camera in &mut config.cameras {
            if camera.ensure_id() {
                generated += 1;
            }
        }
        if generated > 0 {
            tracing::info!("Generated ids for {} camera(s) in {:?}", generated, path);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> CaptureResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> CaptureResult<()> {
        for camera in &self.cameras {
            if !(camera.frame_rate.is_finite() && camera.frame_rate > 0.0) {
                return Err(CaptureError::Config(format!(
                    "camera '{}' has invalid frame rate {}",
                    camera.name, camera.frame_rate
                )));
            }
        }
        if matches!(self.audio, Some(AudioOutputConfig { sample_rate: 0 })) {
            return Err(CaptureError::Config("audio sample rate must be positive".to_string()));
        }
        Ok(())
    }
}
