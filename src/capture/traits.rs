//! Capture trait definitions
//!
//! Seams to the collaborators that live outside the engine: the encoder that
//! receives frames, the geometric visibility test, and the audio output
//! configuration.

use crate::utils::error::CaptureResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Smallest render target the encoders accept
pub const MIN_DIMENSION: u32 = 8;

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Clamp both dimensions to [`MIN_DIMENSION`]
    pub fn clamped(self) -> Self {
        Self {
            width: self.width.max(MIN_DIMENSION),
            height: self.height.max(MIN_DIMENSION),
        }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Encoder preset handed to the video sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncoderPreset {
    #[default]
    H264Default,
    HevcNvidia,
}

impl EncoderPreset {
    /// Pick the preset for a GPU vendor string
    pub fn select(gpu_vendor: &str, allow_nvidia: bool) -> Self {
        if allow_nvidia && gpu_vendor.to_lowercase().contains("nvidia") {
            EncoderPreset::HevcNvidia
        } else {
            EncoderPreset::H264Default
        }
    }
}

/// Everything a sink needs to open a camera's output
#[derive(Debug, Clone, PartialEq)]
pub struct VideoTarget {
    pub path: PathBuf,
    pub resolution: Resolution,
    pub frame_rate: f64,
    pub preset: EncoderPreset,
}

/// Receives the paced frame stream of one camera
///
/// `push_frame` means "encode what the camera currently shows";
/// `repeat_frame` means "no new content this tick".
pub trait FrameSink: Send {
    fn begin(&mut self, target: &VideoTarget) -> CaptureResult<()>;

    fn push_frame(&mut self);

    fn repeat_frame(&mut self);

    fn finish(&mut self) -> CaptureResult<()>;
}

/// Counters observed by a [`CountingSink`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SinkStats {
    pub pushed: u64,
    pub repeated: u64,
    pub target: Option<PathBuf>,
    pub finished: bool,
}

/// Sink that only counts commands
///
/// Creates an empty placeholder at the target path so the session directory
/// has the expected layout. Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct CountingSink {
    stats: Arc<Mutex<SinkStats>>,
    touch_files: bool,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also create an empty file at the target path on `begin`
    pub fn with_placeholder_files(mut self) -> Self {
        self.touch_files = true;
        self
    }

    pub fn stats(&self) -> SinkStats {
        self.stats.lock().clone()
    }
}

impl FrameSink for CountingSink {
    fn begin(&mut self, target: &VideoTarget) -> CaptureResult<()> {
        if self.touch_files {
            std::fs::File::create(&target.path)?;
        }
        *self.stats.lock() = SinkStats {
            target: Some(target.path.clone()),
            ..SinkStats::default()
        };
        Ok(())
    }

    fn push_frame(&mut self) {
        self.stats.lock().pushed += 1;
    }

    fn repeat_frame(&mut self) {
        self.stats.lock().repeated += 1;
    }

    fn finish(&mut self) -> CaptureResult<()> {
        self.stats.lock().finished = true;
        Ok(())
    }
}

/// Answers whether a subject is observable by a camera on a given tick
pub trait VisibilityProbe: Send {
    fn is_visible(&self, camera_id: &str, subject_id: &str, tick: u64) -> bool;
}

impl<F> VisibilityProbe for F
where
    F: Fn(&str, &str, u64) -> bool + Send,
{
    fn is_visible(&self, camera_id: &str, subject_id: &str, tick: u64) -> bool {
        self(camera_id, subject_id, tick)
    }
}

/// Probe that never sees anyone; only camera owners end up visible
#[derive(Debug, Clone, Copy, Default)]
pub struct NoVisibility;

impl VisibilityProbe for NoVisibility {
    fn is_visible(&self, _camera_id: &str, _subject_id: &str, _tick: u64) -> bool {
        false
    }
}

/// Active audio output configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioOutputConfig {
    pub sample_rate: u32,
}

impl Default for AudioOutputConfig {
    fn default() -> Self {
        Self { sample_rate: 48_000 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_selection() {
        assert_eq!(
            EncoderPreset::select("NVIDIA Corporation", true),
            EncoderPreset::HevcNvidia
        );
        assert_eq!(
            EncoderPreset::select("NVIDIA Corporation", false),
            EncoderPreset::H264Default
        );
        assert_eq!(
            EncoderPreset::select("Advanced Micro Devices", true),
            EncoderPreset::H264Default
        );
    }

    #[test]
    fn test_resolution_clamp() {
        assert_eq!(Resolution::new(2, 600).clamped(), Resolution::new(8, 600));
    }

    #[test]
    fn test_counting_sink_shares_stats() {
        let sink = CountingSink::new();
        let mut boxed: Box<dyn FrameSink> = Box::new(sink.clone());

        let target = VideoTarget {
            path: PathBuf::from("Cam_x.mp4"),
            resolution: Resolution::default(),
            frame_rate: 30.0,
            preset: EncoderPreset::H264Default,
        };
        boxed.begin(&target).unwrap();
        boxed.push_frame();
        boxed.push_frame();
        boxed.repeat_frame();
        boxed.finish().unwrap();

        let stats = sink.stats();
        assert_eq!(stats.pushed, 2);
        assert_eq!(stats.repeated, 1);
        assert!(stats.finished);
        assert_eq!(stats.target, Some(PathBuf::from("Cam_x.mp4")));
    }

    #[test]
    fn test_closure_probe() {
        let probe = |camera: &str, subject: &str, _tick: u64| camera == "a" && subject == "p1";
        assert!(probe.is_visible("a", "p1", 0));
        assert!(!probe.is_visible("b", "p1", 0));
        assert!(!NoVisibility.is_visible("a", "p1", 0));
    }
}
