//! Session recording
//!
//! This module implements the capture session:
//! - SessionTimeline driving cameras and the session lifecycle from render ticks
//! - CaptureCamera pairing a frame pacer with a video sink
//! - Live and retroactive event annotation over the cameras' frame counters

pub mod annotator;
pub mod camera;
pub mod coordinator;
pub mod pending;
pub mod scheduler;
pub mod state;
pub mod visibility;

pub use camera::CaptureCamera;
pub use coordinator::{CameraHandle, RecordingEvent, SessionTimeline};
pub use state::{CameraSettings, CaptureConfig, SessionState};
pub use visibility::{SubjectHandle, SubjectId};
