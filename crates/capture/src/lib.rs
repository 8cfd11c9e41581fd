//! Frame capture for genlocked rendering.
//!
//! A [`CaptureSink`] owns the render target. After every frame it either
//! moves the finished frame into a [`FrameSequence`] and installs a fresh
//! target, or leaves it in place when recording is off or the frame falls in
//! the start-up skip window. [`Recorder`] strings the sink together with the
//! genlock scheduler, and [`export`] writes a finished sequence to disk as an
//! MP4 file or a directory of JPG stills.

mod export;
mod frame;
mod sequence;
mod session;
mod sink;

pub use export::{
    capture_stem, export, next_capture_slot, still_file_name, track_frame_rate, CaptureSlot,
    EncoderError, ExportError, ExportMode, ExportReport, FfmpegEncoder, FfmpegOptions,
    VideoEncoder, VideoSession, VideoTrack, JPEG_QUALITY, MAX_CAPTURE_INDEX, VIDEO_EXTENSION,
};
pub use frame::{
    CpuAllocator, CpuFrame, Frame, FrameAllocator, FrameReadback, FrameSize, ReadbackError,
    RenderTarget,
};
pub use sequence::FrameSequence;
pub use session::{
    FinishedCapture, FrameTime, Recorder, RecorderCounters, RecorderOptions, TickReport,
};
pub use sink::{CaptureSettings, CaptureSink, HarvestOutcome};
