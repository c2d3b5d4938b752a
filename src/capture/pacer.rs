//! Fixed-rate frame pacing
//!
//! Converts the render loop's irregular tick deltas into a fixed-rate frame
//! stream. Each camera paces itself against its own accumulated tick time;
//! no clock is shared between cameras.
//!
//! Frames are sampled at their midpoint: frame `n` is due at
//! `start + (n + 0.5) / rate`.

/// Rate used when a camera is configured with a non-positive rate
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// What the pacer decided for one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaceOutcome {
    /// Ahead of schedule: repeat the previous frame, counter unchanged
    Early,
    /// On schedule: one new frame, plus one more when drop debt was paid down
    OnSchedule { caught_up: bool },
    /// Between one and two frames behind: current frame pushed twice
    Behind,
    /// Two or more frames behind: one frame pushed, gap added to drop debt
    Stall { gap: f64 },
}

impl PaceOutcome {
    /// Frames the counter advanced by
    pub fn frames_pushed(&self) -> u64 {
        match self {
            PaceOutcome::Early => 0,
            PaceOutcome::OnSchedule { caught_up: false } => 1,
            PaceOutcome::OnSchedule { caught_up: true } => 2,
            PaceOutcome::Behind => 2,
            PaceOutcome::Stall { .. } => 1,
        }
    }
}

/// Emitted once, when the counter first leaves zero
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FirstFrame {
    /// Accumulated tick time at which the first frame went out
    pub game_time: f64,
    /// Render tick (1-based, since the pacer was reset)
    pub tick_index: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaceStep {
    pub outcome: PaceOutcome,
    pub frame_count: u64,
    pub first_frame: Option<FirstFrame>,
}

/// Per-camera frame pacer
#[derive(Debug, Clone)]
pub struct FramePacer {
    frame_rate: f64,
    start_time: f64,
    game_time: f64,
    frame_count: u64,
    /// Drop debt in seconds
    accrued_gap: f64,
    ticks: u64,
    first_frame_sent: bool,
}

impl FramePacer {
    /// Create a pacer for the given target rate
    pub fn new(frame_rate: f64) -> Self {
        let frame_rate = if frame_rate.is_finite() && frame_rate > 0.0 {
            frame_rate
        } else {
            tracing::warn!(
                "Invalid frame rate {}, falling back to {}",
                frame_rate,
                DEFAULT_FRAME_RATE
            );
            DEFAULT_FRAME_RATE
        };

        Self {
            frame_rate,
            start_time: 0.0,
            game_time: 0.0,
            frame_count: 0,
            accrued_gap: 0.0,
            ticks: 0,
            first_frame_sent: false,
        }
    }

    /// Zero every counter; called when a session enables the camera
    pub fn reset(&mut self) {
        *self = Self::new(self.frame_rate);
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// Seconds per output frame
    pub fn frame_duration(&self) -> f64 {
        1.0 / self.frame_rate
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn game_time(&self) -> f64 {
        self.game_time
    }

    /// Outstanding drop debt in seconds
    pub fn accrued_gap(&self) -> f64 {
        self.accrued_gap
    }

    /// Video time of the next frame due, which is also the current video time
    pub fn frame_time(&self) -> f64 {
        self.start_time + (self.frame_count as f64 + 0.5) * self.frame_duration()
    }

    /// Advance by one render tick
    pub fn tick(&mut self, delta: f64) -> PaceStep {
        let delta = if delta.is_finite() && delta > 0.0 { delta } else { 0.0 };
        let d = self.frame_duration();

        self.ticks += 1;
        self.game_time += delta;

        let gap = self.game_time - self.frame_time();

        let outcome = if gap < 0.0 {
            PaceOutcome::Early
        } else if gap < d {
            self.frame_count += 1;

            let caught_up = self.accrued_gap > d;
            if caught_up {
                self.accrued_gap -= d;
                self.frame_count += 1;
            }
            PaceOutcome::OnSchedule { caught_up }
        } else if gap < d * 2.0 {
            self.frame_count += 2;
            PaceOutcome::Behind
        } else {
            // The counter is not back-filled to cover the gap; only the debt grows
            self.accrued_gap += gap;
            self.frame_count += 1;
            PaceOutcome::Stall { gap }
        };

        let first_frame = if !self.first_frame_sent && self.frame_count > 0 {
            self.first_frame_sent = true;
            Some(FirstFrame {
                game_time: self.game_time,
                tick_index: self.ticks,
            })
        } else {
            None
        };

        PaceStep {
            outcome,
            frame_count: self.frame_count,
            first_frame,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_steady_ticks_track_rate() {
        let mut pacer = FramePacer::new(30.0);
        for _ in 0..300 {
            pacer.tick(1.0 / 30.0);
        }

        let expected = pacer.game_time() * 30.0;
        assert!(
            (pacer.frame_count() as f64 - expected).abs() <= 1.0,
            "frame count {} should be within one frame of {}",
            pacer.frame_count(),
            expected
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            .. ProptestConfig::default()
        })]

        #[test]
        fn test_jittered_ticks_stay_within_one_frame(
            rate in prop::sample::select(vec![24.0, 30.0, 60.0, 144.0]),
            jitter in prop::collection::vec(0.0f64..0.99, 1..2_000),
        ) {
            let d = 1.0 / rate;
            let mut pacer = FramePacer::new(rate);
            let mut last = 0;

            // Anything under one frame duration never stalls
            for unit in jitter {
                let step = pacer.tick(unit * d);
                prop_assert!(step.frame_count >= last, "frame counter went backwards");
                last = step.frame_count;

                let expected = pacer.game_time() * rate;
                prop_assert!((step.frame_count as f64 - expected).abs() <= 1.0);
            }
            prop_assert_eq!(pacer.accrued_gap(), 0.0);
        }
    }

    #[test]
    fn test_fast_ticks_repeat_frames() {
        // Two ticks per frame: every other tick is early
        let mut pacer = FramePacer::new(4.0);
        let outcomes: Vec<PaceOutcome> = (0..4).map(|_| pacer.tick(0.125).outcome).collect();

        assert_eq!(
            outcomes,
            vec![
                PaceOutcome::OnSchedule { caught_up: false },
                PaceOutcome::Early,
                PaceOutcome::OnSchedule { caught_up: false },
                PaceOutcome::Early,
            ]
        );
        assert_eq!(pacer.frame_count(), 2);
    }

    #[test]
    fn test_single_stall_increments_once() {
        let mut pacer = FramePacer::new(4.0);

        // gap = 1.0 - 0.125 = 0.875, well past two frames
        let step = pacer.tick(1.0);

        assert_eq!(step.outcome, PaceOutcome::Stall { gap: 0.875 });
        assert_eq!(step.frame_count, 1);
        assert_eq!(pacer.accrued_gap(), 0.875);
        assert!((pacer.frame_count() as f64) < pacer.game_time() * 4.0);
    }

    #[test]
    fn test_behind_pushes_two() {
        let mut pacer = FramePacer::new(4.0);
        pacer.tick(0.125);

        // gap = 0.75 - 0.375 = 0.375: between one and two frames late
        let step = pacer.tick(0.625);
        assert_eq!(step.outcome, PaceOutcome::Behind);
        assert_eq!(step.frame_count, 3);
        assert_eq!(pacer.accrued_gap(), 0.0);
    }

    #[test]
    fn test_drop_debt_is_paid_back() {
        let mut pacer = FramePacer::new(4.0);

        pacer.tick(0.125);
        assert_eq!(pacer.frame_count(), 1);

        assert_eq!(pacer.tick(1.0).outcome, PaceOutcome::Stall { gap: 0.75 });
        assert_eq!(pacer.tick(0.0).outcome, PaceOutcome::Stall { gap: 0.5 });
        assert_eq!(pacer.accrued_gap(), 1.25);
        assert_eq!(pacer.frame_count(), 3);

        assert_eq!(pacer.tick(0.0).outcome, PaceOutcome::Behind);
        assert_eq!(pacer.tick(0.0).outcome, PaceOutcome::Early);
        assert_eq!(pacer.frame_count(), 5);

        let step = pacer.tick(0.25);
        assert_eq!(step.outcome, PaceOutcome::OnSchedule { caught_up: true });
        assert_eq!(step.frame_count, 7);
        assert_eq!(pacer.accrued_gap(), 1.0);
    }

    #[test]
    fn test_first_frame_reported_once() {
        let mut pacer = FramePacer::new(4.0);

        // Zero-length tick: gap = -0.125, nothing pushed yet
        assert_eq!(pacer.tick(0.0).first_frame, None);

        let step = pacer.tick(0.125);
        assert_eq!(
            step.first_frame,
            Some(FirstFrame {
                game_time: 0.125,
                tick_index: 2
            })
        );
        assert_eq!(pacer.tick(0.25).first_frame, None);

        pacer.reset();
        assert_eq!(pacer.frame_count(), 0);
        assert!(pacer.tick(0.125).first_frame.is_some());
    }

    #[test]
    fn test_invalid_inputs_degrade() {
        let mut pacer = FramePacer::new(0.0);
        assert_eq!(pacer.frame_rate(), DEFAULT_FRAME_RATE);

        pacer.tick(f64::NAN);
        pacer.tick(-1.0);
        assert_eq!(pacer.game_time(), 0.0);
        assert_eq!(pacer.frame_count(), 0);
    }

    #[test]
    fn test_frame_time_midpoint() {
        let mut pacer = FramePacer::new(4.0);
        assert_eq!(pacer.frame_time(), 0.125);
        pacer.tick(0.125);
        assert_eq!(pacer.frame_time(), 0.375);
    }
}
