//! Genlock emulation for a real-time render loop.
//!
//! A [`GenlockScheduler`] paces the loop at a fixed real-world rate, as if an
//! external frame-sync signal were driving it, while a [`SimulatedClock`]
//! advances game time by a fixed delta per frame. Late frames are detected and
//! the tick counter is resynchronised to real time instead of drifting.
//!
//! ```text
//!   render frame ─▶ harvest ─▶ wait_for_next_tick ─▶ render frame ─▶ ...
//!                                │
//!                                ├─ coarse sleep until safety margin
//!                                ├─ spin until boundary
//!                                └─ set simulated capture delta
//! ```

mod clock;
mod scheduler;
mod stats;

pub use clock::{ManualClock, MonotonicClock, RealClock, SimulatedClock};
pub use scheduler::{
    clamp_rate, GenlockConfig, GenlockScheduler, TickOutcome, TickState, TimingThresholds,
    TimingViolation, MIN_GENLOCK_RATE,
};
pub use stats::{TimingStats, MAX_SMOOTHING};
