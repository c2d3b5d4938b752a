//! Session timeline
//!
//! Owns the session lifecycle and drives every registered camera from the
//! host's render loop. Live events, retroactive captures and deferred stops
//! are all resolved against the cameras' frame counters here.

use super::annotator;
use super::camera::CaptureCamera;
use super::pending::PendingEvents;
use super::scheduler::DeferredQueue;
use super::state::{CameraSettings, CaptureConfig, SessionState, MAX_NVIDIA_STREAMS};
use super::visibility::{SubjectHandle, SubjectId, SubjectRegistry};
use crate::capture::audio::AudioStreamWriter;
use crate::capture::pacer::PaceOutcome;
use crate::capture::traits::{EncoderPreset, FrameSink, NoVisibility, VisibilityProbe};
use crate::project::bundle;
use crate::project::schema::{EventKind, EventRecord, SessionDocument};
use crate::utils::error::{CaptureError, CaptureResult};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Events emitted by the timeline
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    SessionStarted {
        session_id: String,
    },
    SessionStopped {
        session_id: String,
        event_count: usize,
    },
    /// An event was appended to the running session
    EventCommitted {
        session_id: String,
        event_id: String,
        index: usize,
    },
    /// A retroactive capture fired after its session stopped
    LateEvent {
        session_id: Option<String>,
        event: EventRecord,
    },
    FirstFrame {
        camera_id: String,
        at: DateTime<Utc>,
        game_time: f64,
        tick_index: u64,
    },
    /// A camera fell two or more frames behind
    FrameDrop {
        camera_id: String,
        gap: f64,
    },
    /// Session runs without an audio track
    AudioUnavailable,
    AudioFinalized {
        bytes: u64,
    },
    Error(String),
}

/// Stable handle of a registered camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraHandle(usize);

struct RetroCapture {
    /// Session the capture was requested in
    session_id: Option<String>,
    event: EventRecord,
    rollback: f64,
    cameras: Option<Vec<CameraHandle>>,
}

enum DeferredTask {
    Capture(RetroCapture),
    StopSession { session_id: String },
}

/// Drives cameras, events and the session document from render ticks
pub struct SessionTimeline {
    config: CaptureConfig,

    state: Arc<RwLock<SessionState>>,

    /// Current session, or the last one once stopped
    session: Option<SessionDocument>,
    session_dir: Option<PathBuf>,

    cameras: Vec<Option<CaptureCamera>>,
    subjects: SubjectRegistry,
    probe: Box<dyn VisibilityProbe>,

    /// Shared with the host's audio callback
    audio: Option<Arc<AudioStreamWriter>>,

    pending: PendingEvents,
    deferred: DeferredQueue<DeferredTask>,

    /// Monotonic tick time, advanced in every state
    clock: f64,

    event_tx: broadcast::Sender<RecordingEvent>,
}

impl SessionTimeline {
    pub fn new(config: CaptureConfig) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            config,
            state: Arc::new(RwLock::new(SessionState::Idle)),
            session: None,
            session_dir: None,
            cameras: Vec::new(),
            subjects: SubjectRegistry::new(),
            probe: Box::new(NoVisibility),
            audio: None,
            pending: PendingEvents::new(),
            deferred: DeferredQueue::new(),
            clock: 0.0,
            event_tx,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Shared view of the state for observers on other threads
    pub fn state_handle(&self) -> Arc<RwLock<SessionState>> {
        Arc::clone(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecordingEvent> {
        self.event_tx.subscribe()
    }

    /// The running session, or the last archived one
    pub fn session(&self) -> Option<&SessionDocument> {
        self.session.as_ref()
    }

    pub fn session_dir(&self) -> Option<&Path> {
        self.session_dir.as_deref()
    }

    /// Total tick time seen since construction
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Writer the host audio callback should append to
    pub fn audio_writer(&self) -> Option<Arc<AudioStreamWriter>> {
        self.audio.clone()
    }

    /// Live events started but not yet stopped
    pub fn pending_events(&self) -> usize {
        self.pending.len()
    }

    /// Retroactive captures waiting for their trailing window
    pub fn pending_captures(&self) -> usize {
        self.deferred
            .count_where(|task| matches!(task, DeferredTask::Capture(_)))
    }

    fn current_session_id(&self) -> Option<&str> {
        if self.is_running() {
            self.session.as_ref().map(|s| s.session_id.as_str())
        } else {
            None
        }
    }

    fn session_time(&self) -> f64 {
        if self.is_running() {
            self.session.as_ref().map(|s| s.length).unwrap_or(0.0)
        } else {
            0.0
        }
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Local player id, snapshotted by the next session start
    pub fn set_local_user_id(&mut self, user_id: impl Into<String>) {
        self.config.user_id = user_id.into();
    }

    pub fn set_visibility_probe(&mut self, probe: impl VisibilityProbe + 'static) {
        self.probe = Box::new(probe);
    }

    pub fn register_camera(
        &mut self,
        settings: CameraSettings,
        sink: Box<dyn FrameSink>,
    ) -> CameraHandle {
        let mut camera = CaptureCamera::new(settings, sink);
        camera.set_preset(EncoderPreset::select(
            &self.config.gpu_vendor,
            self.config.allow_nvidia_encoding,
        ));

        tracing::info!("Registering camera {} ({})", camera.name(), camera.id());
        if self.is_running() {
            tracing::info!(
                "Camera {} joins at the next session start",
                camera.name()
            );
        }

        self.cameras.push(Some(camera));
        CameraHandle(self.cameras.len() - 1)
    }

    /// Remove a camera, finalizing its output if it is recording
    pub fn unregister_camera(&mut self, handle: CameraHandle) -> Option<CaptureCamera> {
        let mut camera = self.cameras.get_mut(handle.0)?.take()?;
        tracing::info!("Unregistering camera {}", camera.name());

        if camera.is_recording() {
            match (self.session.as_ref(), self.session_dir.as_deref()) {
                (Some(session), Some(dir)) => {
                    if let Err(e) = camera.on_session_stop(session, dir) {
                        tracing::error!("Failed to finalize camera {}: {}", camera.name(), e);
                        let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
                    }
                }
                _ => camera.abort_session(),
            }
        }
        Some(camera)
    }

    pub fn camera(&self, handle: CameraHandle) -> Option<&CaptureCamera> {
        self.cameras.get(handle.0).and_then(Option::as_ref)
    }

    pub fn cameras(&self) -> impl Iterator<Item = (CameraHandle, &CaptureCamera)> {
        self.cameras
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (CameraHandle(i), c)))
    }

    /// Tie a camera to the subject it follows; that subject is always visible to it
    pub fn set_camera_owner(&mut self, handle: CameraHandle, subject: Option<SubjectId>) -> bool {
        match self.cameras.get_mut(handle.0) {
            Some(Some(camera)) => {
                camera.set_owner(subject);
                true
            }
            _ => false,
        }
    }

    pub fn register_subject(&mut self, name: impl Into<String>) -> SubjectHandle {
        self.subjects.register(name)
    }

    pub fn set_subject_id(&mut self, handle: SubjectHandle, id: impl Into<SubjectId>) -> bool {
        self.subjects.set_id(handle, id)
    }

    pub fn unregister_subject(&mut self, handle: SubjectHandle) -> bool {
        self.subjects.unregister(handle)
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Start a session, or return the id of the one already running
    pub fn start_session(&mut self) -> CaptureResult<String> {
        if let Some(session_id) = self.current_session_id() {
            tracing::debug!("Session {} already running", session_id);
            return Ok(session_id.to_string());
        }

        let camera_count = self.cameras.iter().flatten().count();
        if camera_count > MAX_NVIDIA_STREAMS && self.config.allow_nvidia_encoding {
            tracing::warn!(
                "{} cameras exceed the {} NVIDIA encoder streams, using the default encoder",
                camera_count,
                MAX_NVIDIA_STREAMS
            );
            self.config.allow_nvidia_encoding = false;
        }
        let preset =
            EncoderPreset::select(&self.config.gpu_vendor, self.config.allow_nvidia_encoding);

        let session = SessionDocument::new(
            self.config.partner_id.clone(),
            self.config.platform_id.clone(),
            self.config.user_id.clone(),
        );
        let dir = bundle::create_session_dir(&self.config.recordings_root, &session.session_id)?;

        tracing::info!("Starting session {} in {:?}", session.session_id, dir);

        let mut failure = None;
        for camera in self.cameras.iter_mut().flatten() {
            camera.set_preset(preset);
            if let Err(e) = camera.on_session_start(&session.session_id, &dir) {
                tracing::error!("Camera {} failed to start: {}", camera.name(), e);
                failure = Some(e);
                break;
            }
        }
        if let Some(e) = failure {
            for camera in self.cameras.iter_mut().flatten().filter(|c| c.is_recording()) {
                camera.abort_session();
            }
            if let Err(cleanup) = std::fs::remove_dir_all(&dir) {
                tracing::warn!("Failed to remove {:?}: {}", dir, cleanup);
            }
            return Err(e);
        }

        self.audio = match self.config.audio {
            Some(audio_config) => {
                match AudioStreamWriter::create(&bundle::audio_path(&dir), audio_config) {
                    Ok(writer) => Some(Arc::new(writer)),
                    Err(e) => {
                        tracing::warn!("Failed to open audio output, recording without audio: {}", e);
                        let _ = self.event_tx.send(RecordingEvent::AudioUnavailable);
                        None
                    }
                }
            }
            None => {
                tracing::warn!("No audio source found, so no audio will be recorded");
                let _ = self.event_tx.send(RecordingEvent::AudioUnavailable);
                None
            }
        };

        let session_id = session.session_id.clone();
        self.session = Some(session);
        self.session_dir = Some(dir);
        *self.state.write() = SessionState::Running;
        let _ = self.event_tx.send(RecordingEvent::SessionStarted {
            session_id: session_id.clone(),
        });

        tracing::info!("Session {} started with {} camera(s)", session_id, camera_count);
        Ok(session_id)
    }

    /// Stop and archive the running session
    ///
    /// Returns the archived session id, or `None` when nothing was running.
    pub fn stop_session(&mut self) -> CaptureResult<Option<String>> {
        if !self.is_running() {
            tracing::debug!("Stop requested with no running session");
            return Ok(None);
        }
        self.finalize_session().map(Some)
    }

    /// Stop the running session once `delay` seconds of ticks have passed
    pub fn stop_session_after(&mut self, delay: f64) -> CaptureResult<()> {
        let Some(session_id) = self.current_session_id().map(str::to_string) else {
            tracing::debug!("Deferred stop requested with no running session");
            return Ok(());
        };

        if !(delay.is_finite() && delay > 0.0) {
            return self.stop_session().map(|_| ());
        }

        let already_pending = self.deferred.count_where(|task| {
            matches!(task, DeferredTask::StopSession { session_id: id } if *id == session_id)
        }) > 0;
        if already_pending {
            tracing::debug!("Session {} already has a stop pending", session_id);
            return Ok(());
        }

        tracing::info!("Session {} stops in {:.2}s", session_id, delay);
        self.deferred
            .schedule(self.clock + delay, DeferredTask::StopSession { session_id });
        Ok(())
    }

    fn finalize_session(&mut self) -> CaptureResult<String> {
        for event_id in self.pending.open_ids() {
            tracing::info!("Halting event {} as the session is stopping", event_id);
            self.stop_event(&event_id);
        }

        let (session, dir) = match (self.session.as_mut(), self.session_dir.as_deref()) {
            (Some(session), Some(dir)) => (session, dir),
            _ => return Err(CaptureError::Session("no active session to stop".to_string())),
        };

        let mut first_error: Option<CaptureError> = None;
        for camera in self.cameras.iter_mut().flatten().filter(|c| c.is_recording()) {
            if let Err(e) = camera.on_session_stop(session, dir) {
                tracing::error!("Failed to finalize camera {}: {}", camera.name(), e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(audio) = self.audio.take() {
            match audio.finish() {
                Ok(Some(bytes)) => {
                    let _ = self.event_tx.send(RecordingEvent::AudioFinalized { bytes });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!("Failed to finalize audio: {}", e);
                    first_error.get_or_insert(e.into());
                }
            }
        }

        session.end_timestamp = Some(Utc::now());
        if first_error.is_none() {
            if let Err(e) = bundle::write_session(session, dir) {
                first_error = Some(e.into());
            }
        }

        if let Some(e) = first_error {
            tracing::error!("Session {} could not be archived: {}", session.session_id, e);
            *self.state.write() = SessionState::Idle;
            let _ = self.event_tx.send(RecordingEvent::Error(e.to_string()));
            return Err(e);
        }

        *self.state.write() = SessionState::Stopped;
        let _ = self.event_tx.send(RecordingEvent::SessionStopped {
            session_id: session.session_id.clone(),
            event_count: session.events.len(),
        });

        tracing::info!(
            "Session {} stopped after {:.2}s with {} event(s)",
            session.session_id,
            session.length,
            session.events.len()
        );
        Ok(session.session_id.clone())
    }

    // =========================================================================
    // Ticks
    // =========================================================================

    /// Advance by one render tick of `delta` seconds
    pub fn tick(&mut self, delta: f64) {
        let delta = if delta.is_finite() && delta >= 0.0 {
            delta
        } else {
            tracing::warn!("Ignoring invalid tick delta {}", delta);
            0.0
        };
        self.clock += delta;

        if self.is_running() {
            let tick = match self.session.as_mut() {
                Some(session) => {
                    session.length += delta;
                    session.game_frames += 1;
                    session.game_frames
                }
                None => 0,
            };
            self.advance_cameras(delta);
            self.update_visibility(tick);
        }

        self.run_deferred();
    }

    fn advance_cameras(&mut self, delta: f64) {
        for camera in self.cameras.iter_mut().flatten() {
            let Some(step) = camera.tick(delta) else {
                continue;
            };

            if let Some(first) = step.first_frame {
                let _ = self.event_tx.send(RecordingEvent::FirstFrame {
                    camera_id: camera.id().to_string(),
                    at: Utc::now(),
                    game_time: first.game_time,
                    tick_index: first.tick_index,
                });
            }
            if let PaceOutcome::Stall { gap } = step.outcome {
                let _ = self.event_tx.send(RecordingEvent::FrameDrop {
                    camera_id: camera.id().to_string(),
                    gap,
                });
            }
        }
    }

    fn update_visibility(&mut self, tick: u64) {
        for camera in self.cameras.iter_mut().flatten().filter(|c| c.is_recording()) {
            for subject in self.subjects.identified() {
                if camera.is_owner(subject) || self.probe.is_visible(camera.id(), subject, tick) {
                    camera.record_sighting(subject);
                }
            }
        }
    }

    fn run_deferred(&mut self) {
        while let Some(task) = self.deferred.pop_due(self.clock) {
            match task {
                DeferredTask::Capture(capture) => self.fire_capture(capture),
                DeferredTask::StopSession { session_id } => {
                    if self.current_session_id() != Some(session_id.as_str()) {
                        tracing::debug!("Session {} already stopped", session_id);
                        continue;
                    }
                    if let Err(e) = self.stop_session() {
                        tracing::error!("Deferred stop of session {} failed: {}", session_id, e);
                    }
                }
            }
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    fn target_cameras(&self, kind: EventKind, overrides: Option<&[CameraHandle]>) -> Vec<usize> {
        match overrides {
            Some(handles) => {
                let mut targets: Vec<usize> = handles
                    .iter()
                    .map(|h| h.0)
                    .filter(|&i| matches!(self.cameras.get(i), Some(Some(_))))
                    .collect();
                targets.sort_unstable();
                targets.dedup();
                targets
            }
            None => self
                .cameras
                .iter()
                .enumerate()
                .filter(|(_, c)| c.as_ref().is_some_and(|c| c.watches(kind)))
                .map(|(i, _)| i)
                .collect(),
        }
    }

    /// Open a live event on the subscribed (or given) cameras
    ///
    /// Starting an id that is already open restarts it from the current frame.
    pub fn start_event(
        &mut self,
        kind: EventKind,
        cameras: Option<&[CameraHandle]>,
        event_id: Option<String>,
    ) -> String {
        let kind = recordable(kind);
        let event_id = event_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.pending.handle(&event_id).is_some() {
            tracing::debug!("Restarting open event {}", event_id);
        }

        let event = EventRecord::new(event_id.clone(), kind, self.session_time(), Utc::now());
        let handle = self.pending.insert(event);

        let mut opened = 0;
        for index in self.target_cameras(kind, cameras) {
            if let Some(Some(camera)) = self.cameras.get_mut(index) {
                if camera.is_recording() {
                    let window = annotator::open_window(camera);
                    camera.insert_open_window(handle, window);
                    opened += 1;
                }
            }
        }

        tracing::info!("Event {} ({}) started on {} camera(s)", event_id, kind, opened);
        event_id
    }

    /// Close a live event and commit it to the running session
    ///
    /// Unknown ids produce an uncommitted record with no footage.
    pub fn stop_event(&mut self, event_id: &str) -> EventRecord {
        let now = Utc::now();
        let session_time = self.session_time();

        let Some((handle, mut event)) = self.pending.take(event_id) else {
            tracing::debug!("Stop for unknown event {}, nothing recorded", event_id);
            let mut event = EventRecord::new(
                event_id.to_string(),
                EventKind::Unspecified,
                session_time,
                now,
            );
            event.session_end_time = Some(session_time);
            event.end_timestamp = Some(now);
            return event;
        };

        for camera in self.cameras.iter_mut().flatten() {
            if let Some(open) = camera.take_open_window(handle) {
                event.footage.push(annotator::close_window(camera, open));
            }
        }
        event.session_end_time = Some(session_time);
        event.end_timestamp = Some(now);

        tracing::info!(
            "Event {} ({}) stopped with {} footage window(s)",
            event.id,
            event.event_type,
            event.footage.len()
        );
        self.commit(event)
    }

    /// Record an event that reaches `seconds_before` into the past and
    /// `seconds_after` into the future
    ///
    /// Footage is cut once the trailing window has been recorded.
    pub fn capture_event(
        &mut self,
        kind: EventKind,
        seconds_before: f64,
        seconds_after: f64,
        cameras: Option<&[CameraHandle]>,
        event_id: Option<String>,
    ) -> String {
        let kind = recordable(kind);
        let before = non_negative(seconds_before);
        let after = non_negative(seconds_after);
        let event_id = event_id.unwrap_or_else(|| Uuid::new_v4().to_string());

        let now = Utc::now();
        let session_time = self.session_time();
        let mut event = EventRecord::new(
            event_id.clone(),
            kind,
            session_time - before,
            shifted(now, -before),
        );
        event.session_end_time = Some(session_time + after);
        event.end_timestamp = Some(shifted(now, after));

        let capture = RetroCapture {
            session_id: self.current_session_id().map(str::to_string),
            event,
            rollback: before + after,
            cameras: cameras.map(<[CameraHandle]>::to_vec),
        };
        self.deferred
            .schedule(self.clock + after, DeferredTask::Capture(capture));

        tracing::debug!(
            "Capture {} ({}) scheduled, {:.2}s back and {:.2}s ahead",
            event_id,
            kind,
            before,
            after
        );
        event_id
    }

    fn fire_capture(&mut self, capture: RetroCapture) {
        let RetroCapture {
            session_id,
            mut event,
            rollback,
            cameras,
        } = capture;

        for index in self.target_cameras(event.event_type, cameras.as_deref()) {
            let Some(Some(camera)) = self.cameras.get(index) else {
                continue;
            };
            if session_id.is_some() && camera.session_id() == session_id.as_deref() {
                event.footage.push(annotator::rollback_window(camera, rollback));
            }
        }

        let is_current = session_id.is_some() && self.current_session_id() == session_id.as_deref();
        if is_current {
            tracing::info!(
                "Captured event {} ({}) with a {:.2}s rollback",
                event.id,
                event.event_type,
                rollback
            );
            self.commit(event);
            return;
        }

        // The capture outlived its session: keep it with that session in
        // memory, but the archived document on disk stays as written
        match self.session.as_mut() {
            Some(session) if session_id.as_deref() == Some(session.session_id.as_str()) => {
                event.index = session.commit(event.clone());
                tracing::warn!(
                    "Capture {} completed after session {} stopped, not persisted",
                    event.id,
                    session.session_id
                );
            }
            _ => {
                tracing::warn!("Capture {} has no session to join, not recorded", event.id);
            }
        }
        let _ = self
            .event_tx
            .send(RecordingEvent::LateEvent { session_id, event });
    }

    fn commit(&mut self, mut event: EventRecord) -> EventRecord {
        let running = self.is_running();
        match self.session.as_mut() {
            Some(session) if running => {
                event.index = session.commit(event.clone());
                let _ = self.event_tx.send(RecordingEvent::EventCommitted {
                    session_id: session.session_id.clone(),
                    event_id: event.id.clone(),
                    index: event.index,
                });
            }
            _ => {
                tracing::warn!("Event {} ended with no running session, not recorded", event.id);
            }
        }
        event
    }
}

fn non_negative(seconds: f64) -> f64 {
    if seconds.is_finite() {
        seconds.max(0.0)
    } else {
        0.0
    }
}

/// `now` moved by `secs`, or `now` itself when that leaves chrono's range
fn shifted(now: DateTime<Utc>, secs: f64) -> DateTime<Utc> {
    let delta = Duration::microseconds((secs * 1_000_000.0) as i64);
    now.checked_add_signed(delta).unwrap_or_else(|| {
        tracing::warn!("Event timestamp {:+.0}s away is out of range, using now", secs);
        now
    })
}

/// Kinds without a wire code are recorded as `Unspecified`
fn recordable(kind: EventKind) -> EventKind {
    if kind.is_valid() {
        kind
    } else {
        tracing::warn!("Event kind {} has no wire code, recording as Unspecified", kind);
        EventKind::Unspecified
    }
}
