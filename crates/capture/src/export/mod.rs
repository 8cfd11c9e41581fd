//! Writing a finished capture to disk.
//!
//! Each export claims the lowest free `capture_NNNN` name in the output
//! directory and writes either `capture_NNNN.mp4` or a `capture_NNNN/`
//! directory of `frame_NNNN.jpg` stills. Video is used when it is preferred
//! and the encoder reports support; otherwise the stills path is taken.

mod slot;
mod still;
mod video;

use std::path::PathBuf;

use image::DynamicImage;
use tracing::{info, warn};

use crate::frame::{Frame, FrameReadback, ReadbackError};
use crate::sequence::FrameSequence;
use crate::sink::CaptureSettings;

pub use slot::{capture_stem, next_capture_slot, still_file_name, CaptureSlot, MAX_CAPTURE_INDEX};
pub use still::JPEG_QUALITY;
pub use video::{
    track_frame_rate, EncoderError, FfmpegEncoder, FfmpegOptions, VideoEncoder, VideoSession,
    VideoTrack, VIDEO_EXTENSION,
};

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("{} does not exist. Cannot save output", .0.display())]
    DestinationMissing(PathBuf),
    #[error("nothing was captured")]
    NothingCaptured,
    #[error("no free capture name left in {}", .0.display())]
    NoFreeSlot(PathBuf),
    #[error("failed to read back frame {index}: {source}")]
    Readback {
        index: usize,
        #[source]
        source: ReadbackError,
    },
    #[error("failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Encoder(#[from] EncoderError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    Video,
    Stills,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportReport {
    pub frames: usize,
    /// Video file or still directory that was written.
    pub location: PathBuf,
    pub mode: ExportMode,
    /// Video was preferred but unavailable.
    pub degraded: bool,
}

/// Consumes `sequence` and writes it under `settings.output_path`.
///
/// `genlock_rate` sets the video frame rate. Pass `None` for `encoder` to
/// always write stills. Frames are read back and released one at a time.
pub fn export<F, R>(
    sequence: FrameSequence<F>,
    settings: &CaptureSettings,
    readback: &mut R,
    genlock_rate: f64,
    encoder: Option<&dyn VideoEncoder>,
) -> Result<ExportReport, ExportError>
where
    F: Frame,
    R: FrameReadback<F> + ?Sized,
{
    let root = &settings.output_path;
    if !root.is_dir() {
        return Err(ExportError::DestinationMissing(root.clone()));
    }
    let Some(size) = sequence.size() else {
        return Err(ExportError::NothingCaptured);
    };
    let slot = next_capture_slot(root, VIDEO_EXTENSION)
        .ok_or_else(|| ExportError::NoFreeSlot(root.clone()))?;

    let video = encoder.filter(|encoder| encoder.supports_video_encoding());
    let degraded = settings.prefer_video_encoding && video.is_none();
    if degraded {
        warn!("cannot encode MP4 on this system; writing JPG stills instead");
    }
    let frames = sequence.len();
    info!(frames, "saving recorded frames to disk");

    let (mode, location) = match video.filter(|_| settings.prefer_video_encoding) {
        Some(encoder) => {
            let track = VideoTrack::new(size, genlock_rate);
            info!(
                frames,
                fps = track.frame_rate,
                path = %slot.video_path.display(),
                "encoding capture"
            );
            let mut session = encoder.begin(&slot.video_path, &track)?;
            for (index, frame) in sequence.into_iter().enumerate() {
                let pixels = readback
                    .read_rgba(&frame)
                    .map_err(|source| ExportError::Readback { index, source })?;
                drop(frame);
                session.add_frame(&DynamicImage::ImageRgba8(pixels).into_rgb8())?;
            }
            session.finish()?;
            (ExportMode::Video, slot.video_path)
        }
        None => {
            info!(
                frames,
                path = %slot.still_dir.display(),
                "writing capture as still images"
            );
            still::create_still_dir(&slot.still_dir)?;
            for (index, frame) in sequence.into_iter().enumerate() {
                let pixels = readback
                    .read_rgba(&frame)
                    .map_err(|source| ExportError::Readback { index, source })?;
                drop(frame);
                still::write_still(&slot.still_dir.join(still_file_name(index)), pixels)?;
            }
            (ExportMode::Stills, slot.still_dir)
        }
    };

    info!(frames, path = %location.display(), "capture written");
    Ok(ExportReport {
        frames,
        location,
        mode,
        degraded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{CpuAllocator, CpuFrame, FrameAllocator, FrameSize};
    use image::{Rgba, RgbImage};
    use std::cell::RefCell;
    use std::fs;
    use std::path::Path;
    use std::rc::Rc;

    /// Records frames in memory and writes a placeholder file on finish.
    #[derive(Default)]
    struct FakeEncoder {
        supported: bool,
        frames: Rc<RefCell<Vec<RgbImage>>>,
        tracks: RefCell<Vec<VideoTrack>>,
    }

    struct FakeSession {
        path: PathBuf,
        frames: Rc<RefCell<Vec<RgbImage>>>,
    }

    impl VideoEncoder for FakeEncoder {
        fn supports_video_encoding(&self) -> bool {
            self.supported
        }

        fn begin(
            &self,
            path: &Path,
            track: &VideoTrack,
        ) -> Result<Box<dyn VideoSession>, EncoderError> {
            self.tracks.borrow_mut().push(*track);
            Ok(Box::new(FakeSession {
                path: path.to_path_buf(),
                frames: Rc::clone(&self.frames),
            }))
        }
    }

    impl VideoSession for FakeSession {
        fn add_frame(&mut self, frame: &RgbImage) -> Result<(), EncoderError> {
            self.frames.borrow_mut().push(frame.clone());
            Ok(())
        }

        fn finish(self: Box<Self>) -> Result<(), EncoderError> {
            fs::write(&self.path, b"mp4").map_err(|source| EncoderError::Write {
                index: 0,
                source,
            })
        }
    }

    struct FailingReadback;

    impl FrameReadback<CpuFrame> for FailingReadback {
        fn read_rgba(&mut self, _frame: &CpuFrame) -> Result<image::RgbaImage, ReadbackError> {
            Err(ReadbackError::new("device lost"))
        }
    }

    fn sequence(count: u8) -> (FrameSequence<CpuFrame>, CpuAllocator) {
        let mut allocator = CpuAllocator::new();
        let mut sequence = FrameSequence::new();
        for shade in 0..count {
            let mut frame = allocator.allocate(FrameSize::new(8, 6));
            for pixel in frame.pixels_mut().pixels_mut() {
                *pixel = Rgba([shade * 40, 0, 0, 255]);
            }
            sequence.push(frame).expect("uniform size");
        }
        (sequence, allocator)
    }

    fn settings(root: &Path, prefer_video: bool) -> CaptureSettings {
        CaptureSettings {
            enabled: true,
            output_path: root.to_path_buf(),
            skip_first: 0,
            prefer_video_encoding: prefer_video,
        }
    }

    #[test]
    fn writes_numbered_stills_without_video_preference() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (frames, mut allocator) = sequence(3);
        let report = export(frames, &settings(dir.path(), false), &mut allocator, 24.0, None)
            .expect("export");

        assert_eq!(report.mode, ExportMode::Stills);
        assert!(!report.degraded);
        assert_eq!(report.frames, 3);
        assert_eq!(report.location, dir.path().join("capture_0000"));
        for index in 0..3 {
            assert!(report.location.join(still_file_name(index)).is_file());
        }
        assert!(!report.location.join("frame_0003.jpg").exists());
    }

    #[test]
    fn prefers_video_when_supported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let encoder = FakeEncoder {
            supported: true,
            ..FakeEncoder::default()
        };
        let (frames, mut allocator) = sequence(4);
        let report = export(
            frames,
            &settings(dir.path(), true),
            &mut allocator,
            29.97,
            Some(&encoder),
        )
        .expect("export");

        assert_eq!(report.mode, ExportMode::Video);
        assert_eq!(report.location, dir.path().join("capture_0000.mp4"));
        assert!(report.location.is_file());
        let tracks = encoder.tracks.borrow();
        assert_eq!(tracks[0].frame_rate, 30);
        assert_eq!(tracks[0].size, FrameSize::new(8, 6));
        let frames = encoder.frames.borrow();
        let reds: Vec<u8> = frames.iter().map(|f| f.get_pixel(0, 0).0[0]).collect();
        assert_eq!(reds, vec![0, 40, 80, 120]);
    }

    #[test]
    fn falls_back_to_stills_without_encoder_support() {
        let dir = tempfile::tempdir().expect("tempdir");
        let encoder = FakeEncoder::default();
        let (frames, mut allocator) = sequence(2);
        let report = export(
            frames,
            &settings(dir.path(), true),
            &mut allocator,
            24.0,
            Some(&encoder),
        )
        .expect("export");
        assert_eq!(report.mode, ExportMode::Stills);
        assert!(report.degraded);
        assert!(encoder.frames.borrow().is_empty());
    }

    #[test]
    fn missing_destination_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope");
        let (frames, mut allocator) = sequence(1);
        let err = export(frames, &settings(&missing, false), &mut allocator, 24.0, None)
            .expect_err("missing destination");
        assert!(matches!(err, ExportError::DestinationMissing(path) if path == missing));
        assert_eq!(fs::read_dir(dir.path()).expect("list").count(), 0);
    }

    #[test]
    fn empty_capture_writes_nothing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (frames, mut allocator) = sequence(0);
        let err = export(frames, &settings(dir.path(), false), &mut allocator, 24.0, None)
            .expect_err("empty");
        assert!(matches!(err, ExportError::NothingCaptured));
        assert_eq!(fs::read_dir(dir.path()).expect("list").count(), 0);
    }

    #[test]
    fn repeated_exports_never_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let encoder = FakeEncoder {
            supported: true,
            ..FakeEncoder::default()
        };
        fs::create_dir(dir.path().join("capture_0000")).expect("existing");

        let (frames, mut allocator) = sequence(1);
        let first = export(
            frames,
            &settings(dir.path(), true),
            &mut allocator,
            24.0,
            Some(&encoder),
        )
        .expect("first");
        let (frames, mut allocator) = sequence(1);
        let second = export(frames, &settings(dir.path(), false), &mut allocator, 24.0, None)
            .expect("second");

        assert_eq!(first.location, dir.path().join("capture_0001.mp4"));
        assert_eq!(second.location, dir.path().join("capture_0002"));
    }

    #[test]
    fn readback_failure_is_reported_with_frame_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (frames, _) = sequence(2);
        let err = export(frames, &settings(dir.path(), false), &mut FailingReadback, 24.0, None)
            .expect_err("readback");
        assert!(matches!(err, ExportError::Readback { index: 0, .. }));
    }
}
