//! Session document definitions
//!
//! These types are the persisted contract with downstream tooling (editors,
//! highlight pickers, clippers). Field names are camelCase JSON and must stay
//! stable across releases.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Event Kinds
// =============================================================================

/// First code of the reserved custom range
pub const CUSTOM_EVENT_BASE: u16 = 1000;

/// Number of custom slots, `Custom(1)` through `Custom(16)`
pub const CUSTOM_EVENT_SLOTS: u16 = 16;

/// Gameplay event kind
///
/// Serialized as its numeric code. `Custom(n)` is only valid for `n` in
/// `1..=CUSTOM_EVENT_SLOTS` and maps to codes 1000..=1015; out of range
/// kinds have no code and fail to serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "u16")]
pub enum EventKind {
    /// Placeholder for events stopped without ever being started
    Unspecified,

    // Core game events
    StartGame,
    StopGame,
    StartSubGame,
    StopSubGame,

    // PvP
    GameWon,
    GameLost,
    PointWon,
    PointLost,

    // Expanded PvP
    AssetGained,
    AssetLost,

    // Progression
    NextLevelReached,

    // Story-driven
    ImportantMoment,
    EmotionalMoment,
    GroupScene,

    // Scoring/results
    PlayerProfile,
    PlayerRating,
    OverallRating,
    FinalResults,
    ShowAwards,

    Custom(u16),
}

impl EventKind {
    /// Custom kind for slot `n`, `None` outside `1..=CUSTOM_EVENT_SLOTS`
    pub fn custom(n: u16) -> Option<Self> {
        (1..=CUSTOM_EVENT_SLOTS)
            .contains(&n)
            .then_some(EventKind::Custom(n))
    }

    /// Whether this kind has a wire code
    pub fn is_valid(&self) -> bool {
        self.code().is_some()
    }

    /// Numeric wire code, `None` for an out of range custom slot
    pub fn code(&self) -> Option<u16> {
        let code = match self {
            EventKind::Unspecified => 0,
            EventKind::StartGame => 1,
            EventKind::StopGame => 2,
            EventKind::StartSubGame => 3,
            EventKind::StopSubGame => 4,
            EventKind::GameWon => 100,
            EventKind::GameLost => 101,
            EventKind::PointWon => 102,
            EventKind::PointLost => 103,
            EventKind::AssetGained => 200,
            EventKind::AssetLost => 201,
            EventKind::NextLevelReached => 300,
            EventKind::ImportantMoment => 400,
            EventKind::EmotionalMoment => 401,
            EventKind::GroupScene => 402,
            EventKind::PlayerProfile => 501,
            EventKind::PlayerRating => 502,
            EventKind::OverallRating => 503,
            EventKind::FinalResults => 504,
            EventKind::ShowAwards => 505,
            EventKind::Custom(n) => {
                return EventKind::custom(*n).map(|_| CUSTOM_EVENT_BASE + n - 1);
            }
        };
        Some(code)
    }

    /// Human readable name, written next to the code in documents
    pub fn name(&self) -> String {
        match self {
            EventKind::Custom(n) => format!("Custom{}", n),
            other => format!("{:?}", other),
        }
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let code = self.code().ok_or_else(|| {
            <S::Error as serde::ser::Error>::custom(format!(
                "event kind {} has no wire code",
                self.name()
            ))
        })?;
        serializer.serialize_u16(code)
    }
}

impl TryFrom<u16> for EventKind {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        let kind = match code {
            0 => EventKind::Unspecified,
            1 => EventKind::StartGame,
            2 => EventKind::StopGame,
            3 => EventKind::StartSubGame,
            4 => EventKind::StopSubGame,
            100 => EventKind::GameWon,
            101 => EventKind::GameLost,
            102 => EventKind::PointWon,
            103 => EventKind::PointLost,
            200 => EventKind::AssetGained,
            201 => EventKind::AssetLost,
            300 => EventKind::NextLevelReached,
            400 => EventKind::ImportantMoment,
            401 => EventKind::EmotionalMoment,
            402 => EventKind::GroupScene,
            501 => EventKind::PlayerProfile,
            502 => EventKind::PlayerRating,
            503 => EventKind::OverallRating,
            504 => EventKind::FinalResults,
            505 => EventKind::ShowAwards,
            c if (CUSTOM_EVENT_BASE..CUSTOM_EVENT_BASE + CUSTOM_EVENT_SLOTS).contains(&c) => {
                EventKind::Custom(c - CUSTOM_EVENT_BASE + 1)
            }
            c => return Err(format!("unknown event code {}", c)),
        };
        Ok(kind)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Camera Types
// =============================================================================

/// Declared camera rig type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum CameraType {
    Follow,
    #[default]
    Fixed,
    Panoramic,
    ThreeSixty,
    Custom(u16),
}

impl fmt::Display for CameraType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraType::Follow => write!(f, "Follow"),
            CameraType::Fixed => write!(f, "Fixed"),
            CameraType::Panoramic => write!(f, "Panoramic"),
            CameraType::ThreeSixty => write!(f, "ThreeSixty"),
            CameraType::Custom(n) => write!(f, "Custom:{}", n),
        }
    }
}

impl FromStr for CameraType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Follow" => Ok(CameraType::Follow),
            "Fixed" => Ok(CameraType::Fixed),
            "Panoramic" => Ok(CameraType::Panoramic),
            "ThreeSixty" => Ok(CameraType::ThreeSixty),
            other => other
                .strip_prefix("Custom:")
                .and_then(|n| n.parse().ok())
                .map(CameraType::Custom)
                .ok_or_else(|| format!("unknown camera type '{}'", other)),
        }
    }
}

impl From<CameraType> for String {
    fn from(camera_type: CameraType) -> Self {
        camera_type.to_string()
    }
}

impl TryFrom<String> for CameraType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Container format of the per-camera video file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoFormat {
    #[default]
    #[serde(rename = "MPEG4")]
    Mpeg4,
}

impl VideoFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            VideoFormat::Mpeg4 => "mp4",
        }
    }
}

// =============================================================================
// Footage Windows & Events
// =============================================================================

/// A frame range inside one camera's continuous recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FootageWindow {
    pub camera_id: String,
    pub video_start_time: f64,
    pub video_end_time: f64,
    pub video_start_frame: u64,
    pub video_end_frame: u64,
    /// Subjects seen by the camera at some frame inside the window
    pub subject_ids: BTreeSet<String>,
}

impl FootageWindow {
    /// Number of frames spanned by the window
    pub fn frame_span(&self) -> u64 {
        self.video_end_frame.saturating_sub(self.video_start_frame)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub id: String,
    /// Position in the session's event list, assigned on commit
    pub index: usize,
    pub event_type: EventKind,
    pub event_type_name: String,
    /// Seconds since session start
    pub session_start_time: f64,
    #[serde(default)]
    pub session_end_time: Option<f64>,
    pub start_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub end_timestamp: Option<DateTime<Utc>>,
    pub footage: Vec<FootageWindow>,
}

impl EventRecord {
    /// Create an open event starting at the given session time
    pub fn new(id: String, kind: EventKind, session_time: f64, started: DateTime<Utc>) -> Self {
        Self {
            id,
            index: 0,
            event_type: kind,
            event_type_name: kind.name(),
            session_start_time: session_time,
            session_end_time: None,
            start_timestamp: started,
            end_timestamp: None,
            footage: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.session_end_time.is_none()
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDocument {
    pub session_id: String,
    pub partner_id: String,
    pub platform_id: String,
    pub user_id: String,
    pub start_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub end_timestamp: Option<DateTime<Utc>>,
    /// Accumulated wall-clock seconds while running
    pub length: f64,
    /// Render ticks observed while running
    pub game_frames: u64,
    pub events: Vec<EventRecord>,
}

impl SessionDocument {
    /// Create a new session with a fresh id, starting now
    pub fn new(partner_id: String, platform_id: String, user_id: String) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            partner_id,
            platform_id,
            user_id,
            start_timestamp: Utc::now(),
            end_timestamp: None,
            length: 0.0,
            game_frames: 0,
            events: Vec::new(),
        }
    }

    /// Append an event, stamping its index with its list position
    pub fn commit(&mut self, mut event: EventRecord) -> usize {
        let index = self.events.len();
        event.index = index;
        self.events.push(event);
        index
    }
}

// =============================================================================
// Camera Header
// =============================================================================

/// Sidecar written next to each camera's video file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraHeader {
    pub partner_id: String,
    pub platform_id: String,
    pub video_filename: String,
    pub camera_id: String,
    pub session_id: String,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: DateTime<Utc>,
    pub total_frames: u64,
    pub video_format: VideoFormat,
    pub camera_type: CameraType,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(camera: &str, start: u64, end: u64) -> FootageWindow {
        FootageWindow {
            camera_id: camera.to_string(),
            video_start_time: start as f64 / 30.0,
            video_end_time: end as f64 / 30.0,
            video_start_frame: start,
            video_end_frame: end,
            subject_ids: ["p1".to_string(), "p2".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn test_event_kind_codes() {
        assert_eq!(EventKind::GameWon.code(), Some(100));
        assert_eq!(EventKind::ShowAwards.code(), Some(505));
        assert_eq!(EventKind::Custom(1).code(), Some(1000));
        assert_eq!(EventKind::Custom(16).code(), Some(1015));

        assert_eq!(EventKind::try_from(402), Ok(EventKind::GroupScene));
        assert_eq!(EventKind::try_from(1000), Ok(EventKind::Custom(1)));
        assert_eq!(EventKind::try_from(1015), Ok(EventKind::Custom(16)));
        assert!(EventKind::try_from(7).is_err());
        assert!(EventKind::try_from(1016).is_err());
        assert!(EventKind::try_from(2000).is_err());
        assert!(EventKind::try_from(u16::MAX).is_err());

        assert_eq!(EventKind::PointLost.name(), "PointLost");
        assert_eq!(EventKind::Custom(3).name(), "Custom3");
    }

    #[test]
    fn test_custom_slots_are_bounded() {
        assert_eq!(EventKind::custom(1), Some(EventKind::Custom(1)));
        assert_eq!(EventKind::custom(16), Some(EventKind::Custom(16)));
        assert_eq!(EventKind::custom(0), None);
        assert_eq!(EventKind::custom(17), None);

        for n in [0, 17, 64537, u16::MAX] {
            let kind = EventKind::Custom(n);
            assert_eq!(kind.code(), None);
            assert!(!kind.is_valid());
            assert!(serde_json::to_string(&kind).is_err());
        }

        // Every valid slot survives a round trip through its code
        for n in 1..=CUSTOM_EVENT_SLOTS {
            let kind = EventKind::Custom(n);
            assert_eq!(EventKind::try_from(kind.code().unwrap()), Ok(kind));
        }
    }

    #[test]
    fn test_camera_type_strings() {
        assert_eq!("ThreeSixty".parse::<CameraType>(), Ok(CameraType::ThreeSixty));
        assert_eq!("Custom:7".parse::<CameraType>(), Ok(CameraType::Custom(7)));
        assert!("Orbit".parse::<CameraType>().is_err());

        let json = serde_json::to_string(&CameraType::Custom(7)).unwrap();
        assert_eq!(json, "\"Custom:7\"");
        assert_eq!(serde_json::to_string(&VideoFormat::Mpeg4).unwrap(), "\"MPEG4\"");
    }

    #[test]
    fn test_commit_assigns_index_in_commit_order() {
        let mut session = SessionDocument::new("partner".into(), "pc".into(), "user".into());
        let now = Utc::now();

        // Started later but committed first
        let late = EventRecord::new("b".into(), EventKind::GameWon, 5.0, now);
        let early = EventRecord::new("a".into(), EventKind::StartGame, 1.0, now);

        assert_eq!(session.commit(late), 0);
        assert_eq!(session.commit(early), 1);
        assert_eq!(session.events[0].id, "b");
        assert_eq!(session.events[1].index, 1);
    }

    #[test]
    fn test_session_round_trip() {
        let mut session = SessionDocument::new("partner".into(), "pc".into(), "user".into());
        let now = Utc::now();

        for (i, kind) in [EventKind::StartGame, EventKind::PointWon, EventKind::Custom(2)]
            .into_iter()
            .enumerate()
        {
            let mut event = EventRecord::new(format!("ev-{}", i), kind, i as f64, now);
            event.session_end_time = Some(i as f64 + 1.0);
            event.end_timestamp = Some(now);
            event.footage.push(window("cam-a", i as u64 * 10, i as u64 * 10 + 30));
            event.footage.push(window("cam-b", 0, 5));
            session.commit(event);
        }
        session.length = 12.5;
        session.game_frames = 750;

        let json = serde_json::to_string_pretty(&session).unwrap();
        let parsed: SessionDocument = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed, session);
        let indices: Vec<usize> = parsed.events.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(parsed.events[2].event_type, EventKind::Custom(2));
        assert_eq!(parsed.events[1].footage[0].video_start_frame, 10);
        assert_eq!(parsed.events[1].footage[0].video_end_frame, 40);
    }

    #[test]
    fn test_event_json_shape() {
        let event = EventRecord::new("x".into(), EventKind::GameLost, 0.0, Utc::now());
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["eventType"], 101);
        assert_eq!(value["eventTypeName"], "GameLost");
        assert!(value["sessionEndTime"].is_null());
        assert!(event.is_open());
    }
}
