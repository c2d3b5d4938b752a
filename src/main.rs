//! avica-sim - drive a capture session from a simulated render loop
//!
//! Usage: `avica-sim [config.json]`
//!
//! Ticks arrive on a tokio interval with jittered deltas and the occasional
//! hitch, so the pacer's repeat, catch-up and drop paths all get exercised.
//! Cameras write through counting sinks that leave placeholder video files.

use anyhow::{bail, Context, Result};
use avica_capture::capture::{default_output_config, CountingSink};
use avica_capture::project::schema::CameraType;
use avica_capture::project::EventKind;
use avica_capture::recorder::{
    CameraSettings, CaptureConfig, RecordingEvent, SessionState, SessionTimeline,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::TAU;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;

const TARGET_FPS: f64 = 60.0;
const SIM_SECONDS: f64 = 6.0;
const STOP_DELAY: f64 = 0.5;
/// Every this many ticks the loop hitches for a few frames
const HITCH_EVERY: u64 = 150;

fn load_config() -> Result<CaptureConfig> {
    let mut config = match std::env::args().nth(1) {
        Some(path) => CaptureConfig::load(&PathBuf::from(&path))
            .with_context(|| format!("failed to load config {}", path))?,
        None => CaptureConfig {
            partner_id: "demo".to_string(),
            platform_id: "sim".to_string(),
            user_id: "local".to_string(),
            ..CaptureConfig::default()
        },
    };

    if config.cameras.is_empty() {
        config.cameras.push(
            CameraSettings::new("follow")
                .with_type(CameraType::Follow)
                .watching([EventKind::GameWon, EventKind::ImportantMoment]),
        );
        config.cameras.push(
            CameraSettings::new("overview")
                .with_type(CameraType::Panoramic)
                .with_frame_rate(24.0)
                .watching([EventKind::GameWon]),
        );
    }
    if config.audio.is_none() {
        config.audio = default_output_config();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    avica_capture::init_tracing("avica_capture=debug,avica_sim=info");
    tracing::info!("Starting avica-sim v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    let camera_settings = config.cameras.clone();
    let mut timeline = SessionTimeline::new(config);

    let mut sinks = Vec::new();
    for settings in camera_settings {
        let sink = CountingSink::new().with_placeholder_files();
        let name = settings.name.clone();
        let handle = timeline.register_camera(settings, Box::new(sink.clone()));
        sinks.push((handle, name, sink));
    }

    let player = timeline.register_subject("player");
    timeline.set_subject_id(player, "local");
    let rival = timeline.register_subject("rival");
    timeline.set_subject_id(rival, "rival");
    if let Some((handle, _, _)) = sinks.first() {
        timeline.set_camera_owner(*handle, Some("local".to_string()));
    }
    // The rival wanders in and out of view every 1.5s of ticks
    timeline.set_visibility_probe(|_camera: &str, subject: &str, tick: u64| {
        subject == "rival" && tick % 90 < 45
    });

    let mut events = timeline.subscribe();
    let listener = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RecordingEvent::FrameDrop { camera_id, gap }) => {
                    tracing::info!("Camera {} dropped {:.3}s", camera_id, gap);
                }
                Ok(RecordingEvent::LateEvent { event, .. }) => {
                    tracing::info!("Late capture {} ({})", event.id, event.event_type);
                }
                Ok(RecordingEvent::SessionStopped { session_id, event_count }) => {
                    tracing::info!("Session {} archived with {} event(s)", session_id, event_count);
                    break;
                }
                Ok(other) => tracing::debug!("{:?}", other),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Listener lagged, {} notifications missed", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let session_id = timeline
        .start_session()
        .context("failed to start session")?;
    let audio = timeline.audio_writer();
    let state = timeline.state_handle();

    let frame = 1.0 / TARGET_FPS;
    let mut interval = tokio::time::interval(Duration::from_secs_f64(frame));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut phase = 0.0f32;
    let mut live_event = None;
    let mut tick: u64 = 0;

    while *state.read() == SessionState::Running {
        interval.tick().await;
        tick += 1;

        let delta = if tick % HITCH_EVERY == 0 {
            frame * 5.0
        } else {
            frame * rng.gen_range(0.6..1.4)
        };
        timeline.tick(delta);

        if let Some(audio) = &audio {
            let frames = (delta * audio.sample_rate() as f64) as usize;
            let step = 440.0 * TAU / audio.sample_rate() as f32;
            let mut block = Vec::with_capacity(frames * 2);
            for _ in 0..frames {
                let sample = phase.sin() * 0.25;
                block.push(sample);
                block.push(sample);
                phase = (phase + step) % TAU;
            }
            audio.write_block(&block);
        }

        match tick {
            60 => live_event = Some(timeline.start_event(EventKind::ImportantMoment, None, None)),
            180 => {
                if let Some(id) = live_event.take() {
                    timeline.stop_event(&id);
                }
            }
            240 => {
                timeline.capture_event(EventKind::GameWon, 2.0, 1.0, None, None);
            }
            _ => {}
        }

        if timeline.clock() >= SIM_SECONDS {
            timeline
                .stop_session_after(STOP_DELAY)
                .context("failed to stop session")?;
        }
    }

    if timeline.state() != SessionState::Stopped {
        bail!("session {} was not archived", session_id);
    }
    match tokio::time::timeout(Duration::from_secs(1), listener).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("Listener task failed: {}", e),
        Err(_) => tracing::warn!("Listener missed the session stop notification"),
    }

    for (handle, name, sink) in &sinks {
        let stats = sink.stats();
        let debt = timeline.camera(*handle).map(|c| c.accrued_gap()).unwrap_or(0.0);
        tracing::info!(
            "Camera {}: {} frames pushed, {} repeated, {:.3}s drop debt",
            name,
            stats.pushed,
            stats.repeated,
            debt
        );
    }

    let dir = timeline
        .session_dir()
        .context("session has no output directory")?;
    println!("{}", dir.display());
    Ok(())
}
