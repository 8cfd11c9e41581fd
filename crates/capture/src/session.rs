use genlock::{
    GenlockConfig, GenlockScheduler, RealClock, SimulatedClock, TickOutcome, TickState,
    TimingStats, TimingThresholds,
};
use tracing::debug;

use crate::export::{export, ExportError, ExportReport, VideoEncoder};
use crate::frame::{FrameAllocator, FrameReadback, FrameSize};
use crate::sequence::FrameSequence;
use crate::sink::{CaptureSettings, CaptureSink, HarvestOutcome};

#[derive(Debug, Clone)]
pub struct RecorderOptions {
    pub genlock: GenlockConfig,
    pub thresholds: TimingThresholds,
    pub capture: CaptureSettings,
    pub size: FrameSize,
    pub stats_smoothing: f64,
}

/// Simulated time of the frame about to be rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    /// Zero-based frame number.
    pub frame: u64,
    pub time: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub harvest: HarvestOutcome,
    pub tick: TickOutcome,
}

/// Running totals since the recorder started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderCounters {
    pub frames: u64,
    pub drops: u64,
    pub overshoots: u64,
    pub rate_resets: u64,
}

/// Drives one render loop: genlocked pacing, simulated time and capture.
///
/// Each frame the caller runs [`Recorder::begin_frame`], draws into
/// [`Recorder::render_target`] and then calls [`Recorder::end_frame`], which
/// harvests the frame and blocks until the next genlock tick.
pub struct Recorder<A: FrameAllocator, C: RealClock> {
    clock: C,
    scheduler: GenlockScheduler,
    genlock: GenlockConfig,
    state: TickState,
    simulated: SimulatedClock,
    sink: CaptureSink<A>,
    settings: CaptureSettings,
    stats: TimingStats,
    counters: RecorderCounters,
}

impl<A: FrameAllocator, C: RealClock> Recorder<A, C> {
    pub fn new(clock: C, allocator: A, options: RecorderOptions) -> Self {
        let mut simulated = SimulatedClock::new();
        simulated.set_capture_delta(options.genlock.simulated_tick_delta());
        Self {
            clock,
            scheduler: GenlockScheduler::new(options.thresholds),
            genlock: options.genlock,
            state: TickState::new(),
            simulated,
            sink: CaptureSink::new(allocator, options.size, options.capture.skip_first),
            settings: options.capture,
            stats: TimingStats::new(options.stats_smoothing),
            counters: RecorderCounters::default(),
        }
    }

    /// Advances simulated time for the next frame.
    pub fn begin_frame(&mut self) -> FrameTime {
        let time = self.simulated.advance();
        FrameTime {
            frame: self.simulated.frame() - 1,
            time,
            delta: self.simulated.last_delta(),
        }
    }

    pub fn render_target(&mut self) -> &mut A::Frame {
        self.sink.render_target()
    }

    /// Harvests the finished frame and waits for the next genlock tick.
    pub fn end_frame(&mut self) -> TickReport {
        let harvest = self.sink.harvest(&self.settings);
        let (state, tick) = self.scheduler.wait_for_next_tick(
            &self.clock,
            &self.genlock,
            self.state,
            &mut self.simulated,
            harvest.skipped,
        );
        self.state = state;
        self.stats.record(tick.woke_at, self.simulated.elapsed());

        self.counters.frames += 1;
        if tick.rate_reset {
            self.counters.rate_resets += 1;
        }
        match tick.violation {
            Some(violation) if violation.is_drop() => self.counters.drops += 1,
            Some(_) => self.counters.overshoots += 1,
            None => {}
        }
        TickReport { harvest, tick }
    }

    pub fn last_render(&self) -> Option<&A::Frame> {
        self.sink.last_render()
    }

    pub fn stats(&self) -> &TimingStats {
        &self.stats
    }

    pub fn counters(&self) -> RecorderCounters {
        self.counters
    }

    pub fn tick_state(&self) -> TickState {
        self.state
    }

    pub fn simulated(&self) -> &SimulatedClock {
        &self.simulated
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn captured(&self) -> usize {
        self.sink.sequence().len()
    }

    pub fn genlock(&self) -> &GenlockConfig {
        &self.genlock
    }

    /// Takes effect at the next tick. A rate change restarts tick counting.
    pub fn set_genlock(&mut self, genlock: GenlockConfig) {
        self.genlock = genlock;
    }

    pub fn set_thresholds(&mut self, thresholds: TimingThresholds) {
        self.scheduler.set_thresholds(thresholds);
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Replaces the capture switches; a new skip count restarts the skip
    /// window.
    pub fn set_settings(&mut self, settings: CaptureSettings) {
        if settings.skip_first != self.settings.skip_first {
            debug!(frames = settings.skip_first, "restarting skip window");
            self.sink.restart_skip_window(settings.skip_first);
        }
        self.settings = settings;
    }

    /// See [`CaptureSink::set_size`].
    pub fn set_size(&mut self, size: FrameSize) -> bool {
        self.sink.set_size(size)
    }

    pub fn size(&self) -> FrameSize {
        self.sink.size()
    }

    pub fn set_stats_smoothing(&mut self, smoothing: f64) {
        self.stats = TimingStats::new(smoothing);
    }

    /// Stops the loop and hands over what was captured.
    pub fn finish(self) -> FinishedCapture<A> {
        let (sequence, allocator) = self.sink.into_parts();
        FinishedCapture {
            sequence,
            allocator,
            settings: self.settings,
            genlock_rate: self.genlock.effective_rate(),
        }
    }
}

pub struct FinishedCapture<A: FrameAllocator> {
    pub sequence: FrameSequence<A::Frame>,
    pub allocator: A,
    pub settings: CaptureSettings,
    pub genlock_rate: f64,
}

impl<A> FinishedCapture<A>
where
    A: FrameAllocator + FrameReadback<<A as FrameAllocator>::Frame>,
{
    /// Writes the capture if recording is enabled; returns `Ok(None)`
    /// otherwise.
    pub fn export(
        mut self,
        encoder: Option<&dyn VideoEncoder>,
    ) -> Result<Option<ExportReport>, ExportError> {
        if !self.settings.enabled {
            return Ok(None);
        }
        export(
            self.sequence,
            &self.settings,
            &mut self.allocator,
            self.genlock_rate,
            encoder,
        )
        .map(Some)
    }
}
