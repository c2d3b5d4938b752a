//! Session directory read/write operations
//!
//! One recordings root holds one directory per session:
//! - events.json: the session document with every committed event
//! - audio.wav: the mixed audio track (absent when no audio source existed)
//! - Cam_<cameraId>.mp4: one continuous video per camera
//! - Cam_<cameraId>.json: the camera header for that video

use super::schema::{CameraHeader, SessionDocument, VideoFormat};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Session document file name
pub const SESSION_DOCUMENT: &str = "events.json";

/// Audio track file name
pub const AUDIO_FILE: &str = "audio.wav";

/// Prefix of per-session directories
pub const SESSION_DIR_PREFIX: &str = "Session_";

/// Bundle-related errors
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid session directory: {0}")]
    InvalidBundle(String),

    #[error("Missing required file: {0}")]
    MissingFile(String),
}

/// Default recordings root: `<cwd>/recordings`
pub fn default_recordings_root() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("recordings")
}

/// Directory holding everything recorded for a session
pub fn session_dir(root: &Path, session_id: &str) -> PathBuf {
    root.join(format!("{}{}", SESSION_DIR_PREFIX, session_id))
}

fn camera_file_stem(camera_id: &str) -> String {
    format!("Cam_{}", camera_id)
}

/// File name of a camera's video inside the session directory
pub fn camera_video_filename(camera_id: &str, format: VideoFormat) -> String {
    format!("{}.{}", camera_file_stem(camera_id), format.extension())
}

pub fn camera_video_path(dir: &Path, camera_id: &str, format: VideoFormat) -> PathBuf {
    dir.join(camera_video_filename(camera_id, format))
}

pub fn camera_header_path(dir: &Path, camera_id: &str) -> PathBuf {
    dir.join(format!("{}.json", camera_file_stem(camera_id)))
}

pub fn audio_path(dir: &Path) -> PathBuf {
    dir.join(AUDIO_FILE)
}

/// Create the session directory
pub fn create_session_dir(root: &Path, session_id: &str) -> Result<PathBuf, BundleError> {
    let dir = session_dir(root, session_id);
    fs::create_dir_all(&dir)?;
    tracing::debug!("Created session directory {:?}", dir);
    Ok(dir)
}

/// Write the session document
pub fn write_session(session: &SessionDocument, dir: &Path) -> Result<PathBuf, BundleError> {
    if !dir.is_dir() {
        return Err(BundleError::InvalidBundle(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let path = dir.join(SESSION_DOCUMENT);
    let content = serde_json::to_string_pretty(session)?;
    fs::write(&path, content)?;

    tracing::debug!(
        "Saved session {} ({} events) to {:?}",
        session.session_id,
        session.events.len(),
        path
    );

    Ok(path)
}

/// Read the session document from a session directory
pub fn read_session(dir: &Path) -> Result<SessionDocument, BundleError> {
    if !dir.is_dir() {
        return Err(BundleError::InvalidBundle(
            "Path is not a directory".to_string(),
        ));
    }

    let path = dir.join(SESSION_DOCUMENT);
    if !path.exists() {
        return Err(BundleError::MissingFile(SESSION_DOCUMENT.to_string()));
    }

    let content = fs::read_to_string(&path)?;
    let session: SessionDocument = serde_json::from_str(&content)?;

    Ok(session)
}

/// Write a camera header next to the camera's video
pub fn write_camera_header(header: &CameraHeader, dir: &Path) -> Result<PathBuf, BundleError> {
    let path = camera_header_path(dir, &header.camera_id);
    let content = serde_json::to_string_pretty(header)?;
    fs::write(&path, content)?;
    Ok(path)
}

pub fn read_camera_header(dir: &Path, camera_id: &str) -> Result<CameraHeader, BundleError> {
    let path = camera_header_path(dir, camera_id);
    if !path.exists() {
        return Err(BundleError::MissingFile(
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        ));
    }

    let content = fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Check whether a path holds a finalized session
pub fn is_valid_session_dir(path: &Path) -> bool {
    path.is_dir() && path.join(SESSION_DOCUMENT).exists()
}

/// List finalized session directories under a recordings root
pub fn list_sessions(root: &Path) -> Result<Vec<PathBuf>, BundleError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut sessions: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .map(|n| n.to_string_lossy().starts_with(SESSION_DIR_PREFIX))
                .unwrap_or(false)
                && is_valid_session_dir(path)
        })
        .collect();
    sessions.sort();

    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::schema::{CameraType, EventKind, EventRecord};
    use chrono::Utc;
    use tempfile::tempdir;

    #[test]
    fn test_layout_names() {
        let root = Path::new("/tmp/recordings");
        let dir = session_dir(root, "abc");
        assert_eq!(dir, root.join("Session_abc"));
        assert_eq!(
            camera_video_path(&dir, "cam1", VideoFormat::Mpeg4),
            dir.join("Cam_cam1.mp4")
        );
        assert_eq!(camera_header_path(&dir, "cam1"), dir.join("Cam_cam1.json"));
        assert_eq!(audio_path(&dir), dir.join("audio.wav"));
    }

    #[test]
    fn test_write_and_read_session() {
        let root = tempdir().unwrap();

        let mut session = SessionDocument::new("partner".into(), "pc".into(), "user".into());
        session.commit(EventRecord::new("e1".into(), EventKind::GameWon, 2.0, Utc::now()));

        let dir = create_session_dir(root.path(), &session.session_id).unwrap();
        assert!(!is_valid_session_dir(&dir));

        write_session(&session, &dir).unwrap();
        assert!(is_valid_session_dir(&dir));

        let loaded = read_session(&dir).unwrap();
        assert_eq!(loaded, session);

        let listed = list_sessions(root.path()).unwrap();
        assert_eq!(listed, vec![dir]);
    }

    #[test]
    fn test_read_missing_document() {
        let root = tempdir().unwrap();
        let dir = create_session_dir(root.path(), "empty").unwrap();

        match read_session(&dir) {
            Err(BundleError::MissingFile(name)) => assert_eq!(name, SESSION_DOCUMENT),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_camera_header_round_trip() {
        let root = tempdir().unwrap();
        let now = Utc::now();
        let header = CameraHeader {
            partner_id: "partner".into(),
            platform_id: "pc".into(),
            video_filename: camera_video_filename("cam1", VideoFormat::Mpeg4),
            camera_id: "cam1".into(),
            session_id: "s1".into(),
            start_timestamp: now,
            end_timestamp: now,
            total_frames: 900,
            video_format: VideoFormat::Mpeg4,
            camera_type: CameraType::Panoramic,
        };

        write_camera_header(&header, root.path()).unwrap();
        let loaded = read_camera_header(root.path(), "cam1").unwrap();
        assert_eq!(loaded, header);
        assert!(read_camera_header(root.path(), "cam2").is_err());
    }
}
