use std::fmt;
use std::time::Duration;

use tracing::{debug, warn};

use crate::clock::{RealClock, SimulatedClock};

/// Lowest genlock rate the scheduler will run at, in ticks per real second.
pub const MIN_GENLOCK_RATE: f64 = 1.0;

/// Clamps a requested genlock rate into the supported range.
///
/// Non-finite and sub-1 rates fall back to [`MIN_GENLOCK_RATE`].
pub fn clamp_rate(rate: f64) -> f64 {
    if rate.is_finite() && rate >= MIN_GENLOCK_RATE {
        rate
    } else {
        MIN_GENLOCK_RATE
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenlockConfig {
    rate: f64,
    simulated_tick_delta: f64,
}

impl GenlockConfig {
    /// Builds a config from a genlock rate and a game-time rate, both in
    /// frames per second.
    pub fn from_rates(genlock_rate: f64, game_time_rate: f64) -> Self {
        let mut config = Self {
            rate: genlock_rate,
            simulated_tick_delta: 0.0,
        };
        config.set_game_time_rate(game_time_rate);
        config
    }

    /// Requested rate, exactly as configured.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Rate the scheduler actually runs at.
    pub fn effective_rate(&self) -> f64 {
        clamp_rate(self.rate)
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = rate;
    }

    pub fn simulated_tick_delta(&self) -> f64 {
        self.simulated_tick_delta
    }

    /// Sets the simulated delta to `1 / game_time_rate`.
    ///
    /// A non-positive game-time rate follows the genlock rate instead.
    pub fn set_game_time_rate(&mut self, game_time_rate: f64) {
        let rate = if game_time_rate.is_finite() && game_time_rate > 0.0 {
            game_time_rate
        } else {
            debug!(
                game_time_rate,
                "invalid game-time rate; following genlock rate"
            );
            self.effective_rate()
        };
        self.simulated_tick_delta = 1.0 / rate;
    }
}

impl Default for GenlockConfig {
    fn default() -> Self {
        Self::from_rates(24.0, 24.0)
    }
}

/// Tick bookkeeping carried from one scheduler call to the next.
///
/// A `current_rate` of zero means no tick has happened yet; the first call
/// always re-arms the counter.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TickState {
    pub last_tick_index: u64,
    pub current_rate: f64,
}

impl TickState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restarts tick counting if `rate` differs from the recorded rate.
    ///
    /// Returns the new state and whether a reset happened.
    pub fn rearm(self, rate: f64) -> (Self, bool) {
        if self.current_rate == rate {
            (self, false)
        } else {
            (
                Self {
                    last_tick_index: 0,
                    current_rate: rate,
                },
                true,
            )
        }
    }

    /// Real time of the next genlock boundary.
    pub fn next_target(&self) -> f64 {
        (self.last_tick_index + 1) as f64 / self.current_rate
    }

    /// Snaps the tick index to the boundary nearest to `now`.
    pub fn resync(self, now: f64) -> Self {
        Self {
            last_tick_index: (now.max(0.0) * self.current_rate).round() as u64,
            ..self
        }
    }

    fn advanced(self) -> Self {
        Self {
            last_tick_index: self.last_tick_index + 1,
            ..self
        }
    }
}

/// Tunables for the wait and the lateness classification.
///
/// `overshoot_fraction` and `drop_fraction` are fractions of one tick period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingThresholds {
    pub safety_margin: Duration,
    pub overshoot_fraction: f64,
    pub drop_fraction: f64,
}

impl Default for TimingThresholds {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_millis(10),
            overshoot_fraction: 0.1,
            drop_fraction: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimingViolation {
    /// The frame finished after the boundary it should have waited for.
    RenderBehind { at: f64 },
    /// The wait woke up a full drop threshold past the boundary.
    LateWake { at: f64 },
    /// The wait woke up late, but not late enough to count as a drop.
    Overshoot { at: f64, percent: f64 },
}

impl TimingViolation {
    pub fn is_drop(&self) -> bool {
        !matches!(self, TimingViolation::Overshoot { .. })
    }

    pub fn at(&self) -> f64 {
        match *self {
            TimingViolation::RenderBehind { at }
            | TimingViolation::LateWake { at }
            | TimingViolation::Overshoot { at, .. } => at,
        }
    }
}

impl fmt::Display for TimingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingViolation::RenderBehind { at } => {
                write!(f, "frame drop: rendering too slow (at {at:.3})")
            }
            TimingViolation::LateWake { at } => {
                write!(f, "frame drop: waiting for genlock too slow (at {at:.3})")
            }
            TimingViolation::Overshoot { at, percent } => {
                write!(f, "waited {percent:.0}% past next genlock (at {at:.3})")
            }
        }
    }
}

/// Result of one [`GenlockScheduler::wait_for_next_tick`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    /// Tick index after the call.
    pub tick: u64,
    /// Boundary the call waited for.
    pub target: f64,
    /// Real time when the call finished waiting.
    pub woke_at: f64,
    pub slept: Duration,
    pub rate_reset: bool,
    pub violation: Option<TimingViolation>,
    /// Whether the violation was logged.
    pub reported: bool,
    /// Simulated delta handed to the simulated clock.
    pub simulated_delta: f64,
}

#[derive(Debug, Clone, Default)]
pub struct GenlockScheduler {
    thresholds: TimingThresholds,
}

impl GenlockScheduler {
    pub fn new(thresholds: TimingThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &TimingThresholds {
        &self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: TimingThresholds) {
        self.thresholds = thresholds;
    }

    /// Blocks until the next genlock boundary and sets the simulated delta.
    ///
    /// Sleeps until `safety_margin` before the boundary, then spins on
    /// `clock` until the boundary is reached. `quiet` suppresses the warning
    /// log for violations (they are still reported in the outcome).
    pub fn wait_for_next_tick<C>(
        &self,
        clock: &C,
        config: &GenlockConfig,
        state: TickState,
        simulated: &mut SimulatedClock,
        quiet: bool,
    ) -> (TickState, TickOutcome)
    where
        C: RealClock + ?Sized,
    {
        let rate = config.effective_rate();
        let (mut state, rate_reset) = state.rearm(rate);
        if rate_reset {
            debug!(
                requested = config.rate(),
                rate, "genlock rate changed; tick counting restarted"
            );
        }

        let simulated_delta = config.simulated_tick_delta();
        simulated.set_capture_delta(simulated_delta);

        let target = state.next_target();
        let now = clock.now();
        if now > target {
            // Nothing was missed yet right after a reset.
            let startup = state.last_tick_index == 0;
            state = state.resync(now);
            let violation = TimingViolation::RenderBehind { at: now };
            let reported = !quiet && !startup;
            if reported {
                warn!(tick = state.last_tick_index, "{violation}");
            }
            return (
                state,
                TickOutcome {
                    tick: state.last_tick_index,
                    target,
                    woke_at: now,
                    slept: Duration::ZERO,
                    rate_reset,
                    violation: Some(violation),
                    reported,
                    simulated_delta,
                },
            );
        }

        let budget = target - now - self.thresholds.safety_margin.as_secs_f64();
        let slept = if budget > 0.0 {
            let duration = Duration::from_secs_f64(budget);
            clock.sleep(duration);
            duration
        } else {
            Duration::ZERO
        };

        let mut woke_at = clock.now();
        while woke_at < target {
            std::hint::spin_loop();
            woke_at = clock.now();
        }
        state = state.advanced();

        let period = 1.0 / rate;
        let late = woke_at - target;
        let violation = if late > self.thresholds.drop_fraction * period {
            state = state.resync(woke_at);
            Some(TimingViolation::LateWake { at: woke_at })
        } else if late > self.thresholds.overshoot_fraction * period {
            Some(TimingViolation::Overshoot {
                at: woke_at,
                percent: late / period * 100.0,
            })
        } else {
            None
        };

        let reported = violation.is_some() && !quiet;
        if let Some(violation) = violation.filter(|_| reported) {
            warn!(tick = state.last_tick_index, "{violation}");
        }

        (
            state,
            TickOutcome {
                tick: state.last_tick_index,
                target,
                woke_at,
                slept,
                rate_reset,
                violation,
                reported,
                simulated_delta,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    /// Clock whose sleeps overshoot by a fixed amount, to provoke late wakes.
    struct OversleepingClock {
        inner: ManualClock,
        extra: f64,
    }

    impl RealClock for OversleepingClock {
        fn now(&self) -> f64 {
            self.inner.now()
        }

        fn sleep(&self, duration: Duration) {
            self.inner.sleep(duration);
            self.inner.advance(self.extra);
        }
    }

    fn run(
        scheduler: &GenlockScheduler,
        clock: &impl RealClock,
        config: &GenlockConfig,
        state: TickState,
    ) -> (TickState, TickOutcome) {
        let mut sim = SimulatedClock::new();
        scheduler.wait_for_next_tick(clock, config, state, &mut sim, false)
    }

    #[test]
    fn waits_until_next_boundary() {
        let scheduler = GenlockScheduler::default();
        let clock = ManualClock::new(0.0);
        let config = GenlockConfig::from_rates(24.0, 24.0);
        let (state, outcome) = run(&scheduler, &clock, &config, TickState::new());

        assert_eq!(state.last_tick_index, 1);
        assert!(outcome.rate_reset);
        assert!(outcome.woke_at >= 1.0 / 24.0);
        assert!(outcome.woke_at - 1.0 / 24.0 < 0.001);
        assert!(outcome.violation.is_none());
        let expected_sleep = 1.0 / 24.0 - 0.01;
        assert!((outcome.slept.as_secs_f64() - expected_sleep).abs() < 1e-6);
    }

    #[test]
    fn short_budget_spins_without_sleeping() {
        let scheduler = GenlockScheduler::default();
        let clock = ManualClock::new(0.038);
        let config = GenlockConfig::from_rates(24.0, 24.0);
        let (state, outcome) = run(&scheduler, &clock, &config, TickState::new());
        assert_eq!(state.last_tick_index, 1);
        assert_eq!(outcome.slept, Duration::ZERO);
        assert_eq!(clock.total_slept(), Duration::ZERO);
    }

    #[test]
    fn zero_rate_clamps_to_one_tick_per_second() {
        let scheduler = GenlockScheduler::default();
        let clock = ManualClock::new(0.0);
        let config = GenlockConfig::from_rates(0.0, 24.0);
        let (state, outcome) = run(&scheduler, &clock, &config, TickState::new());
        assert_eq!(state.current_rate, 1.0);
        assert_eq!(state.last_tick_index, 1);
        assert!((outcome.target - 1.0).abs() < 1e-12);
        assert!(outcome.violation.is_none());

        // The clamped rate is stable: no reset on the following tick.
        let (_, second) = run(&scheduler, &clock, &config, state);
        assert!(!second.rate_reset);
        assert!((second.target - 2.0).abs() < 1e-12);
    }

    #[test]
    fn negative_and_nan_rates_clamp() {
        assert_eq!(clamp_rate(-5.0), MIN_GENLOCK_RATE);
        assert_eq!(clamp_rate(f64::NAN), MIN_GENLOCK_RATE);
        assert_eq!(clamp_rate(0.5), MIN_GENLOCK_RATE);
        assert_eq!(clamp_rate(59.94), 59.94);
    }

    #[test]
    fn rate_change_restarts_counting_from_zero() {
        let scheduler = GenlockScheduler::default();
        let clock = ManualClock::new(0.0);
        let mut config = GenlockConfig::from_rates(24.0, 24.0);
        let mut state = TickState::new();
        for _ in 0..5 {
            state = run(&scheduler, &clock, &config, state).0;
        }
        assert_eq!(state.last_tick_index, 5);

        config.set_rate(10.0);
        let (rearmed, reset) = state.rearm(config.effective_rate());
        assert!(reset);
        assert_eq!(rearmed.last_tick_index, 0);
        assert!((rearmed.next_target() - 0.1).abs() < 1e-12);

        // The clock is already past 0.1s, so the first tick under the new rate
        // resynchronises instead of extrapolating from the old index.
        let now = clock.peek();
        let (state, outcome) = run(&scheduler, &clock, &config, state);
        assert!(outcome.rate_reset);
        assert!((outcome.target - 0.1).abs() < 1e-12);
        assert!(matches!(
            outcome.violation,
            Some(TimingViolation::RenderBehind { .. })
        ));
        assert!(!outcome.reported, "startup drop after reset is not reported");
        assert_eq!(state.current_rate, 10.0);
        assert_eq!(state.last_tick_index, (now * 10.0).round() as u64);
    }

    #[test]
    fn render_behind_resyncs_and_returns_immediately() {
        let scheduler = GenlockScheduler::default();
        let clock = ManualClock::new(0.0);
        let config = GenlockConfig::from_rates(24.0, 24.0);
        let state = run(&scheduler, &clock, &config, TickState::new()).0;

        clock.set(0.5);
        let (state, outcome) = run(&scheduler, &clock, &config, state);
        assert_eq!(state.last_tick_index, 12);
        assert_eq!(outcome.slept, Duration::ZERO);
        assert!(outcome.reported);
        assert_eq!(
            outcome.violation,
            Some(TimingViolation::RenderBehind { at: 0.5 })
        );
    }

    #[test]
    fn late_wake_counts_as_drop() {
        let scheduler = GenlockScheduler::default();
        let clock = OversleepingClock {
            inner: ManualClock::new(0.0),
            extra: 0.2,
        };
        let config = GenlockConfig::from_rates(24.0, 24.0);
        let (state, outcome) = run(&scheduler, &clock, &config, TickState::new());
        let violation = outcome.violation.expect("late wake");
        assert!(violation.is_drop());
        assert!(matches!(violation, TimingViolation::LateWake { .. }));
        assert_eq!(
            state.last_tick_index,
            (outcome.woke_at * 24.0).round() as u64
        );
    }

    #[test]
    fn small_oversleep_is_an_overshoot() {
        let scheduler = GenlockScheduler::default();
        // 10ms margin, 20ms oversleep: wake 10ms past a 41.7ms period (24%).
        let clock = OversleepingClock {
            inner: ManualClock::new(0.0),
            extra: 0.02,
        };
        let config = GenlockConfig::from_rates(24.0, 24.0);
        let (state, outcome) = run(&scheduler, &clock, &config, TickState::new());
        assert_eq!(state.last_tick_index, 1, "overshoot does not resync");
        match outcome.violation {
            Some(TimingViolation::Overshoot { percent, .. }) => {
                assert!((percent - 24.0).abs() < 0.5, "percent was {percent}");
            }
            other => panic!("expected overshoot, got {other:?}"),
        }
        assert!(outcome.reported);
    }

    #[test]
    fn thresholds_are_configurable() {
        let scheduler = GenlockScheduler::new(TimingThresholds {
            overshoot_fraction: 0.5,
            ..TimingThresholds::default()
        });
        let clock = OversleepingClock {
            inner: ManualClock::new(0.0),
            extra: 0.02,
        };
        let config = GenlockConfig::from_rates(24.0, 24.0);
        let (_, outcome) = run(&scheduler, &clock, &config, TickState::new());
        assert!(outcome.violation.is_none());
    }

    #[test]
    fn quiet_ticks_do_not_report() {
        let scheduler = GenlockScheduler::default();
        let clock = ManualClock::new(0.0);
        let config = GenlockConfig::from_rates(24.0, 24.0);
        let mut sim = SimulatedClock::new();
        let (state, _) =
            scheduler.wait_for_next_tick(&clock, &config, TickState::new(), &mut sim, true);
        clock.set(1.0);
        let (_, outcome) = scheduler.wait_for_next_tick(&clock, &config, state, &mut sim, true);
        assert!(outcome.violation.is_some());
        assert!(!outcome.reported);
    }

    #[test]
    fn slow_renderer_never_drifts_more_than_one_tick() {
        for rate in [1.0, 7.5, 24.0, 60.0, 144.0] {
            let scheduler = GenlockScheduler::default();
            let clock = ManualClock::new(0.0);
            let config = GenlockConfig::from_rates(rate, rate);
            let mut sim = SimulatedClock::new();
            let mut state = TickState::new();
            for _ in 0..200 {
                clock.advance(1.7 / rate);
                state = scheduler
                    .wait_for_next_tick(&clock, &config, state, &mut sim, true)
                    .0;
                let resynced = (clock.peek() * rate).round() as u64;
                assert!(
                    state.last_tick_index + 1 >= resynced,
                    "rate {rate}: index {} behind {resynced}",
                    state.last_tick_index
                );
            }
        }
    }

    #[test]
    fn sets_simulated_delta_regardless_of_wait() {
        let scheduler = GenlockScheduler::default();
        let clock = ManualClock::new(0.0);
        let config = GenlockConfig::from_rates(24.0, 29.97);
        let mut sim = SimulatedClock::new();
        let (state, outcome) =
            scheduler.wait_for_next_tick(&clock, &config, TickState::new(), &mut sim, false);
        assert!((sim.capture_delta() - 1.0 / 29.97).abs() < 1e-12);
        assert_eq!(outcome.simulated_delta, sim.capture_delta());

        clock.set(3.0);
        scheduler.wait_for_next_tick(&clock, &config, state, &mut sim, false);
        assert!((sim.capture_delta() - 1.0 / 29.97).abs() < 1e-12);
    }

    #[test]
    fn invalid_game_rate_follows_genlock_rate() {
        let config = GenlockConfig::from_rates(30.0, 0.0);
        assert!((config.simulated_tick_delta() - 1.0 / 30.0).abs() < 1e-12);
    }

    #[test]
    fn violation_messages_carry_timestamp_and_percent() {
        let drop = TimingViolation::RenderBehind { at: 1.23456 };
        assert_eq!(drop.to_string(), "frame drop: rendering too slow (at 1.235)");
        let overshoot = TimingViolation::Overshoot {
            at: 2.0,
            percent: 37.4,
        };
        assert_eq!(
            overshoot.to_string(),
            "waited 37% past next genlock (at 2.000)"
        );
    }
}
