use std::path::PathBuf;

use tracing::{debug, warn};

use crate::frame::{Frame, FrameAllocator, FrameSize, RenderTarget};
use crate::sequence::FrameSequence;

/// Recording switches, all adjustable while running.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub enabled: bool,
    pub output_path: PathBuf,
    /// Rendered frames to drop from the start of the capture.
    pub skip_first: u64,
    pub prefer_video_encoding: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            output_path: PathBuf::new(),
            skip_first: 0,
            prefer_video_encoding: false,
        }
    }
}

/// What [`CaptureSink::harvest`] did with the finished frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HarvestOutcome {
    /// A finished frame existed.
    pub harvested: bool,
    /// The frame fell inside the start-up skip window.
    pub skipped: bool,
    /// The frame was moved into the sequence.
    pub retained: bool,
    /// A new render target was allocated.
    pub reallocated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shown {
    Nothing,
    Target,
    Sequence,
    Displaced,
}

/// Owns the render target and the captured frame sequence.
///
/// After each frame finishes rendering, [`CaptureSink::harvest`] either moves
/// the frame into the sequence and installs a fresh target, or leaves it for
/// the renderer to reuse. The most recent finished frame stays reachable
/// through [`CaptureSink::last_render`] for on-screen preview.
pub struct CaptureSink<A: FrameAllocator> {
    allocator: A,
    size: FrameSize,
    target: RenderTarget<A::Frame>,
    displaced: Option<A::Frame>,
    shown: Shown,
    sequence: FrameSequence<A::Frame>,
    skip_remaining: u64,
}

impl<A: FrameAllocator> CaptureSink<A> {
    pub fn new(allocator: A, size: FrameSize, skip_first: u64) -> Self {
        Self {
            allocator,
            size,
            target: RenderTarget::empty(),
            displaced: None,
            shown: Shown::Nothing,
            sequence: FrameSequence::new(),
            skip_remaining: skip_first,
        }
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    /// Changes the size of future render targets.
    ///
    /// Refused once frames have been retained, since every frame of a
    /// capture must share one size.
    pub fn set_size(&mut self, size: FrameSize) -> bool {
        if size == self.size {
            return true;
        }
        if !self.sequence.is_empty() {
            warn!(
                current = %self.size,
                requested = %size,
                "resolution is fixed once capture has started"
            );
            return false;
        }
        self.size = size;
        true
    }

    /// Target the renderer should draw the next frame into.
    ///
    /// Allocates one if none exists or the current one no longer matches the
    /// configured size.
    pub fn render_target(&mut self) -> &mut A::Frame {
        let stale = self
            .target
            .get()
            .map_or(true, |frame| frame.size() != self.size);
        if stale {
            if self.shown == Shown::Target {
                // Keep the finished frame visible until a new one replaces it.
                self.displaced = self.target.take();
                self.shown = Shown::Displaced;
            }
            debug!(size = %self.size, "allocating render target");
            self.target.replace(self.allocator.allocate(self.size));
        }
        let size = self.size;
        let allocator = &mut self.allocator;
        self.target.get_or_insert_with(|| allocator.allocate(size))
    }

    /// Processes the frame that just finished rendering.
    pub fn harvest(&mut self, settings: &CaptureSettings) -> HarvestOutcome {
        let Some(finished) = self.target.take() else {
            return HarvestOutcome::default();
        };
        self.displaced = None;

        let skipped = self.skip_remaining > 0;
        if skipped {
            self.skip_remaining -= 1;
        }

        let mut outcome = HarvestOutcome {
            harvested: true,
            skipped,
            ..HarvestOutcome::default()
        };

        let finished = if settings.enabled && !skipped {
            if finished.size() == self.size && self.sequence.accepts(finished.size()) {
                match self.sequence.push(finished) {
                    Ok(()) => {
                        outcome.retained = true;
                        None
                    }
                    Err(frame) => Some(frame),
                }
            } else {
                warn!(
                    frame = %finished.size(),
                    expected = %self.size,
                    "finished frame has the wrong size; not captured"
                );
                Some(finished)
            }
        } else {
            Some(finished)
        };

        match finished {
            None => {
                self.shown = Shown::Sequence;
                self.target.replace(self.allocator.allocate(self.size));
                outcome.reallocated = true;
            }
            Some(frame) if frame.size() == self.size => {
                self.shown = Shown::Target;
                self.target.replace(frame);
            }
            Some(frame) => {
                self.displaced = Some(frame);
                self.shown = Shown::Displaced;
                self.target.replace(self.allocator.allocate(self.size));
                outcome.reallocated = true;
            }
        }
        outcome
    }

    /// Most recently finished frame, if any.
    pub fn last_render(&self) -> Option<&A::Frame> {
        match self.shown {
            Shown::Nothing => None,
            Shown::Target => self.target.get(),
            Shown::Sequence => self.sequence.last(),
            Shown::Displaced => self.displaced.as_ref(),
        }
    }

    pub fn sequence(&self) -> &FrameSequence<A::Frame> {
        &self.sequence
    }

    /// Frames still to be dropped from the start of the capture.
    pub fn skip_remaining(&self) -> u64 {
        self.skip_remaining
    }

    /// Restarts the skip window with `frames` frames.
    pub fn restart_skip_window(&mut self, frames: u64) {
        self.skip_remaining = frames;
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Releases the render target and hands over the captured frames.
    pub fn into_parts(self) -> (FrameSequence<A::Frame>, A) {
        (self.sequence, self.allocator)
    }
}
