use std::cell::Cell;
use std::time::{Duration, Instant};

/// Source of monotonic wall-clock time, in seconds since the clock started.
///
/// The genlock wait needs two things from a clock: a way to read the current
/// time and a way to suspend the calling thread. Keeping both behind one trait
/// lets the scheduler run against [`ManualClock`] in tests without sleeping.
pub trait RealClock {
    /// Seconds elapsed since the clock's origin.
    fn now(&self) -> f64;
    /// Suspends the calling thread for roughly `duration`.
    fn sleep(&self, duration: Duration);
}

/// Real clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn origin(&self) -> Instant {
        self.origin
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl RealClock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Deterministic clock that only moves when told to.
///
/// Every read advances time by `poll_step` so that a busy-poll against this
/// clock terminates; [`RealClock::sleep`] advances by the requested duration.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<f64>,
    poll_step: f64,
    slept: Cell<Duration>,
}

impl ManualClock {
    pub const DEFAULT_POLL_STEP: f64 = 0.000_1;

    pub fn new(start: f64) -> Self {
        Self::with_poll_step(start, Self::DEFAULT_POLL_STEP)
    }

    pub fn with_poll_step(start: f64, poll_step: f64) -> Self {
        Self {
            now: Cell::new(start),
            poll_step: poll_step.max(f64::EPSILON),
            slept: Cell::new(Duration::ZERO),
        }
    }

    /// Moves the clock to an absolute time without counting as a read.
    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }

    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }

    /// Current time without advancing the clock.
    pub fn peek(&self) -> f64 {
        self.now.get()
    }

    /// Total time spent in [`RealClock::sleep`] so far.
    pub fn total_slept(&self) -> Duration {
        self.slept.get()
    }
}

impl RealClock for ManualClock {
    fn now(&self) -> f64 {
        let current = self.now.get();
        self.now.set(current + self.poll_step);
        current
    }

    fn sleep(&self, duration: Duration) {
        self.slept.set(self.slept.get() + duration);
        self.advance(duration.as_secs_f64());
    }
}

/// Simulated (game) time advanced by a fixed delta per rendered frame.
///
/// The scheduler sets the capture delta before each tick returns; the render
/// loop calls [`SimulatedClock::advance`] once at the start of every frame, so
/// simulated time never depends on how long the previous wait took.
#[derive(Debug, Clone, Default)]
pub struct SimulatedClock {
    elapsed: f64,
    capture_delta: f64,
    last_delta: f64,
    frame: u64,
}

impl SimulatedClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_capture_delta(&mut self, delta: f64) {
        self.capture_delta = delta;
    }

    pub fn capture_delta(&self) -> f64 {
        self.capture_delta
    }

    /// Starts a new frame, advancing simulated time by the capture delta.
    ///
    /// The first frame starts at zero.
    pub fn advance(&mut self) -> f64 {
        if self.frame > 0 {
            self.elapsed += self.capture_delta;
            self.last_delta = self.capture_delta;
        }
        self.frame += 1;
        self.elapsed
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Delta applied by the most recent [`SimulatedClock::advance`].
    pub fn last_delta(&self) -> f64 {
        self.last_delta
    }

    /// Number of frames started so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_per_read_and_sleep() {
        let clock = ManualClock::with_poll_step(1.0, 0.5);
        assert_eq!(clock.now(), 1.0);
        assert_eq!(clock.now(), 1.5);
        clock.sleep(Duration::from_secs(2));
        assert!((clock.peek() - 4.0).abs() < 1e-9);
        assert_eq!(clock.total_slept(), Duration::from_secs(2));
    }

    #[test]
    fn simulated_clock_accumulates_fractional_deltas() {
        let mut sim = SimulatedClock::new();
        sim.set_capture_delta(1.0 / 29.97);
        assert_eq!(sim.advance(), 0.0);
        for _ in 0..2997 {
            sim.advance();
        }
        assert!((sim.elapsed() - 100.0).abs() < 1e-9);
        assert_eq!(sim.frame(), 2998);
    }

    #[test]
    fn simulated_clock_uses_latest_delta() {
        let mut sim = SimulatedClock::new();
        sim.set_capture_delta(0.5);
        sim.advance();
        sim.advance();
        sim.set_capture_delta(0.25);
        sim.advance();
        assert!((sim.elapsed() - 0.75).abs() < 1e-12);
        assert!((sim.last_delta() - 0.25).abs() < 1e-12);
    }
}
