//! Capture primitives
//!
//! Frame pacing, the audio stream writer, and the traits describing the
//! collaborators the engine drives (video sinks, visibility probes).

pub mod audio;
pub mod pacer;
pub mod traits;

pub use audio::{default_output_config, AudioStreamWriter};
pub use pacer::{FirstFrame, FramePacer, PaceOutcome, PaceStep};
pub use traits::{
    AudioOutputConfig, CountingSink, EncoderPreset, FrameSink, NoVisibility, Resolution,
    SinkStats, VideoTarget, VisibilityProbe,
};
