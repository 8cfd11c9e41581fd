use std::time::Duration;

/// Largest smoothing factor accepted by [`TimingStats`].
pub const MAX_SMOOTHING: f64 = 0.999;

/// Relative deviation that resets the running averages.
const RESET_TOLERANCE: f64 = 0.2;

/// Render-rate and game-rate measurements for display collaborators.
///
/// Each [`TimingStats::record`] call takes the real and simulated time of a
/// frame. Frame times are averaged with an exponential filter; a frame that
/// deviates from the average by more than 20% resets the average so the
/// numbers react immediately to rate changes.
#[derive(Debug, Clone)]
pub struct TimingStats {
    smooth: f64,
    last: Option<(f64, f64)>,
    real_frame_time: f64,
    game_frame_time: f64,
    samples: u64,
}

impl TimingStats {
    /// Creates a tracker; `smooth` is clamped to `[0, 0.999]`, where 0
    /// disables averaging.
    pub fn new(smooth: f64) -> Self {
        Self {
            smooth: if smooth.is_finite() {
                smooth.clamp(0.0, MAX_SMOOTHING)
            } else {
                0.0
            },
            last: None,
            real_frame_time: 0.0,
            game_frame_time: 0.0,
            samples: 0,
        }
    }

    pub fn record(&mut self, real: f64, game: f64) {
        self.samples += 1;
        let Some((last_real, last_game)) = self.last.replace((real, game)) else {
            return;
        };
        let real_delta = real - last_real;
        let game_delta = game - last_game;

        let outside = |average: f64, delta: f64| {
            average > (1.0 + RESET_TOLERANCE) * delta || average < (1.0 - RESET_TOLERANCE) * delta
        };
        if outside(self.real_frame_time, real_delta) || outside(self.game_frame_time, game_delta) {
            self.real_frame_time = real_delta;
            self.game_frame_time = game_delta;
        } else {
            let keep = self.smooth;
            self.real_frame_time = keep * self.real_frame_time + (1.0 - keep) * real_delta;
            self.game_frame_time = keep * self.game_frame_time + (1.0 - keep) * game_delta;
        }
    }

    /// True once two frames have been recorded and time has moved forward.
    pub fn is_ready(&self) -> bool {
        self.samples >= 2 && self.real_frame_time > 0.0 && self.game_frame_time > 0.0
    }

    pub fn render_fps(&self) -> f64 {
        rate(self.real_frame_time)
    }

    pub fn game_fps(&self) -> f64 {
        rate(self.game_frame_time)
    }

    pub fn render_frame_time(&self) -> Duration {
        seconds(self.real_frame_time)
    }

    pub fn game_frame_time(&self) -> Duration {
        seconds(self.game_frame_time)
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}

impl Default for TimingStats {
    fn default() -> Self {
        Self::new(0.0)
    }
}

fn rate(frame_time: f64) -> f64 {
    if frame_time > 0.0 {
        1.0 / frame_time
    } else {
        0.0
    }
}

// Saturates instead of panicking on frame times no Duration can hold.
fn seconds(frame_time: f64) -> Duration {
    Duration::try_from_secs_f64(frame_time.max(0.0)).unwrap_or(Duration::MAX)
}
