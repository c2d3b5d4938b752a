//! AVICA capture - frame-paced multi-camera gameplay recording.
//!
//! This is the main library crate of the capture engine. A host game drives a
//! [`recorder::SessionTimeline`] from its render loop; the timeline paces each
//! registered camera to a fixed frame rate, tracks which players every camera
//! has seen, and annotates gameplay events with the footage that covers them.

pub mod capture;
pub mod project;
pub mod recorder;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub use capture::{AudioStreamWriter, FrameSink, VisibilityProbe};
pub use project::{EventKind, EventRecord, FootageWindow, SessionDocument};
pub use recorder::{CameraHandle, CameraSettings, CaptureConfig, RecordingEvent, SessionTimeline};
pub use utils::{CaptureError, CaptureResult};

/// Install the default log subscriber
///
/// `RUST_LOG` overrides the default filter. Safe to call more than once; only
/// the first call installs anything.
pub fn init_tracing(default_filter: &str) {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
