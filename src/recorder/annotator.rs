//! Footage window computation
//!
//! Maps live and retroactive events onto each camera's frame counter.
//! Windows never reach past the frames a camera has actually produced.

use crate::project::schema::FootageWindow;
use crate::recorder::camera::CaptureCamera;

/// Where a live event began on one camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenWindow {
    pub start_frame: u64,
    pub start_time: f64,
}

/// Anchor a live event at the camera's current frame
pub fn open_window(camera: &CaptureCamera) -> OpenWindow {
    OpenWindow {
        start_frame: camera.frame_count(),
        start_time: camera.frame_time(),
    }
}

/// Close a live window at the camera's current frame
pub fn close_window(camera: &CaptureCamera, open: OpenWindow) -> FootageWindow {
    let end_frame = camera.frame_count();
    let start_frame = open.start_frame.min(end_frame);

    FootageWindow {
        camera_id: camera.id().to_string(),
        video_start_time: open.start_time,
        video_end_time: camera.frame_time(),
        video_start_frame: start_frame,
        video_end_frame: end_frame,
        subject_ids: camera.visibility().visible_since(start_frame),
    }
}

/// First frame of a window reaching `rollback_secs` back from `current`
///
/// Ties round to even, and the result saturates at frame zero.
pub fn rollback_start_frame(current: u64, rollback_secs: f64, frame_rate: f64) -> u64 {
    let frames = (sanitize(rollback_secs) * frame_rate).round_ties_even();
    current.saturating_sub(frames as u64)
}

fn sanitize(rollback_secs: f64) -> f64 {
    if rollback_secs.is_finite() {
        rollback_secs.max(0.0)
    } else {
        0.0
    }
}

/// Window ending at the camera's current frame and reaching back `rollback_secs`
pub fn rollback_window(camera: &CaptureCamera, rollback_secs: f64) -> FootageWindow {
    let end_frame = camera.frame_count();
    let start_frame = rollback_start_frame(end_frame, rollback_secs, camera.frame_rate());
    let end_time = camera.frame_time();

    FootageWindow {
        camera_id: camera.id().to_string(),
        video_start_time: end_time - sanitize(rollback_secs),
        video_end_time: end_time,
        video_start_frame: start_frame,
        video_end_frame: end_frame,
        subject_ids: camera.visibility().visible_since(start_frame),
    }
}
