//! Capture camera
//!
//! One recording viewpoint: its settings, its frame pacer, the sink that
//! receives its paced frames, and the bookkeeping footage windows are cut
//! from (visibility cache and open live-event windows).

use crate::capture::pacer::{FramePacer, PaceOutcome, PaceStep};
use crate::capture::traits::{EncoderPreset, FrameSink, VideoTarget};
use crate::project::bundle;
use crate::project::schema::{CameraHeader, CameraType, EventKind, SessionDocument, VideoFormat};
use crate::recorder::annotator::OpenWindow;
use crate::recorder::pending::EventHandle;
use crate::recorder::state::CameraSettings;
use crate::recorder::visibility::{SubjectId, VisibilityCache};
use crate::utils::error::CaptureResult;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;

pub struct CaptureCamera {
    settings: CameraSettings,
    preset: EncoderPreset,
    video_format: VideoFormat,

    /// Subject always treated as visible to this camera
    owner: Option<SubjectId>,

    pacer: FramePacer,
    sink: Box<dyn FrameSink>,

    /// Last-seen frame per subject, for the current session only
    visibility: VisibilityCache,

    /// Live events currently open on this camera
    open_windows: HashMap<EventHandle, OpenWindow>,

    recording: bool,

    /// Session this camera last recorded for
    session_id: Option<String>,
    record_start: Option<DateTime<Utc>>,
}

impl CaptureCamera {
    pub fn new(mut settings: CameraSettings, sink: Box<dyn FrameSink>) -> Self {
        settings.ensure_id();
        settings.resolution = settings.resolution.clamped();
        let pacer = FramePacer::new(settings.frame_rate);

        Self {
            settings,
            preset: EncoderPreset::default(),
            video_format: VideoFormat::default(),
            owner: None,
            pacer,
            sink,
            visibility: VisibilityCache::new(),
            open_windows: HashMap::new(),
            recording: false,
            session_id: None,
            record_start: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.settings.id
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn camera_type(&self) -> CameraType {
        self.settings.camera_type
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    /// Effective frame rate (invalid configured rates fall back to the default)
    pub fn frame_rate(&self) -> f64 {
        self.pacer.frame_rate()
    }

    pub fn frame_count(&self) -> u64 {
        self.pacer.frame_count()
    }

    /// Current video time
    pub fn frame_time(&self) -> f64 {
        self.pacer.frame_time()
    }

    pub fn accrued_gap(&self) -> f64 {
        self.pacer.accrued_gap()
    }

    pub fn preset(&self) -> EncoderPreset {
        self.preset
    }

    pub fn set_preset(&mut self, preset: EncoderPreset) {
        self.preset = preset;
    }

    pub fn watches(&self, kind: EventKind) -> bool {
        self.settings.watched_events.contains(&kind)
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn set_owner(&mut self, subject: Option<SubjectId>) {
        self.owner = subject;
    }

    pub fn is_owner(&self, subject: &str) -> bool {
        self.owner.as_deref() == Some(subject)
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn visibility(&self) -> &VisibilityCache {
        &self.visibility
    }

    /// Mark a subject as seen on the current frame
    pub fn record_sighting(&mut self, subject: &str) {
        self.visibility.mark(subject, self.pacer.frame_count());
    }

    pub fn insert_open_window(&mut self, event: EventHandle, window: OpenWindow) {
        self.open_windows.insert(event, window);
    }

    pub fn take_open_window(&mut self, event: EventHandle) -> Option<OpenWindow> {
        self.open_windows.remove(&event)
    }

    pub fn open_window_count(&self) -> usize {
        self.open_windows.len()
    }

    /// Reset counters and open the video output for a new session
    pub fn on_session_start(&mut self, session_id: &str, dir: &Path) -> CaptureResult<()> {
        self.pacer.reset();
        self.visibility.clear();
        self.open_windows.clear();

        let target = VideoTarget {
            path: bundle::camera_video_path(dir, self.id(), self.video_format),
            resolution: self.settings.resolution,
            frame_rate: self.pacer.frame_rate(),
            preset: self.preset,
        };
        self.sink.begin(&target)?;

        self.recording = true;
        self.session_id = Some(session_id.to_string());
        self.record_start = Some(Utc::now());

        tracing::debug!(
            "Camera {} recording to {:?} ({}x{} @ {} fps, {:?})",
            self.name(),
            target.path,
            target.resolution.width,
            target.resolution.height,
            target.frame_rate,
            target.preset
        );
        Ok(())
    }

    /// Advance the pacer and drive the sink. `None` while not recording.
    pub fn tick(&mut self, delta: f64) -> Option<PaceStep> {
        if !self.recording {
            return None;
        }

        let step = self.pacer.tick(delta);
        match step.outcome {
            PaceOutcome::Early => self.sink.repeat_frame(),
            outcome => {
                for _ in 0..outcome.frames_pushed() {
                    self.sink.push_frame();
                }
            }
        }

        match step.outcome {
            PaceOutcome::Stall { gap } => {
                tracing::warn!(
                    "Significant frame dropping on camera {}: {:.3}s behind at frame {}",
                    self.name(),
                    gap,
                    step.frame_count
                );
            }
            PaceOutcome::OnSchedule { caught_up: true } => {
                tracing::debug!(
                    "Camera {} caught up one frame, {:.3}s of drop debt left",
                    self.name(),
                    self.pacer.accrued_gap()
                );
            }
            _ => {}
        }

        if let Some(first) = step.first_frame {
            tracing::info!(
                "First frame from camera {} at {:.3}s (tick {})",
                self.name(),
                first.game_time,
                first.tick_index
            );
        }

        Some(step)
    }

    /// Finish the video output and write the camera header
    pub fn on_session_stop(
        &mut self,
        session: &SessionDocument,
        dir: &Path,
    ) -> CaptureResult<CameraHeader> {
        self.recording = false;
        self.open_windows.clear();
        self.visibility.clear();
        self.sink.finish()?;

        let end = Utc::now();
        let header = CameraHeader {
            partner_id: session.partner_id.clone(),
            platform_id: session.platform_id.clone(),
            video_filename: bundle::camera_video_filename(self.id(), self.video_format),
            camera_id: self.id().to_string(),
            session_id: session.session_id.clone(),
            start_timestamp: self.record_start.unwrap_or(session.start_timestamp),
            end_timestamp: end,
            total_frames: self.pacer.frame_count(),
            video_format: self.video_format,
            camera_type: self.settings.camera_type,
        };
        bundle::write_camera_header(&header, dir)?;

        if self.pacer.accrued_gap() > 0.0 {
            tracing::info!(
                "Camera {} finished with {:.3}s of unrecovered drop debt",
                self.name(),
                self.pacer.accrued_gap()
            );
        }
        tracing::info!(
            "Camera {} stopped after {} frames",
            self.name(),
            header.total_frames
        );
        Ok(header)
    }

    /// Release the sink after a failed session start
    pub fn abort_session(&mut self) {
        self.recording = false;
        self.open_windows.clear();
        if let Err(e) = self.sink.finish() {
            tracing::warn!("Failed to release sink of camera {}: {}", self.name(), e);
        }
    }
}

impl std::fmt::Debug for CaptureCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureCamera")
            .field("id", &self.settings.id)
            .field("name", &self.settings.name)
            .field("recording", &self.recording)
            .field("frame_count", &self.pacer.frame_count())
            .finish()
    }
}
