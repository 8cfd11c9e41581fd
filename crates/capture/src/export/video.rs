use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdin, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::frame::FrameSize;

/// Container written by the video path.
pub const VIDEO_EXTENSION: &str = "mp4";

#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("video encoding is not available")]
    Unavailable,
    #[error("failed to launch encoder {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encoder rejected frame {index}: {source}")]
    Write {
        index: usize,
        #[source]
        source: std::io::Error,
    },
    #[error("frame {index} is {actual}, track is {expected}")]
    FrameSize {
        index: usize,
        expected: FrameSize,
        actual: FrameSize,
    },
    #[error("encoder exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
}

/// Parameters of the single video track of a capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoTrack {
    pub size: FrameSize,
    pub frame_rate: u32,
    pub include_alpha: bool,
}

impl VideoTrack {
    /// Track for frames captured at `genlock_rate`, rounded to whole frames
    /// per second.
    pub fn new(size: FrameSize, genlock_rate: f64) -> Self {
        Self {
            size,
            frame_rate: track_frame_rate(genlock_rate),
            include_alpha: false,
        }
    }
}

pub fn track_frame_rate(genlock_rate: f64) -> u32 {
    let rounded = (genlock_rate + 0.5).floor();
    if rounded.is_finite() && rounded >= 1.0 {
        rounded.min(u32::MAX as f64) as u32
    } else {
        1
    }
}

/// Platform video encoding capability.
pub trait VideoEncoder {
    fn supports_video_encoding(&self) -> bool;

    /// Opens a session writing a new file at `path`.
    fn begin(
        &self,
        path: &Path,
        track: &VideoTrack,
    ) -> Result<Box<dyn VideoSession>, EncoderError>;
}

/// An open encoding session. Dropping it without calling
/// [`VideoSession::finish`] abandons the output.
pub trait VideoSession {
    fn add_frame(&mut self, frame: &RgbImage) -> Result<(), EncoderError>;
    fn finish(self: Box<Self>) -> Result<(), EncoderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegOptions {
    pub program: PathBuf,
    pub preset: String,
    pub crf: u8,
}

impl Default for FfmpegOptions {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            preset: "slow".to_string(),
            crf: 12,
        }
    }
}

/// H.264 encoding through an external `ffmpeg` process fed raw RGB frames.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    options: FfmpegOptions,
    available: bool,
}

impl FfmpegEncoder {
    /// Probes `options.program` once; the result holds for the encoder's
    /// lifetime.
    pub fn detect(options: FfmpegOptions) -> Self {
        let available = Command::new(&options.program)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false);
        if available {
            debug!(program = %options.program.display(), "video encoder available");
        } else {
            info!(
                program = %options.program.display(),
                "video encoder not found; captures will be written as still images"
            );
        }
        Self { options, available }
    }

    fn command(&self, path: &Path, track: &VideoTrack) -> Command {
        let mut command = Command::new(&self.options.program);
        command
            .args(["-hide_banner", "-loglevel", "error", "-n"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s")
            .arg(track.size.to_string())
            .arg("-r")
            .arg(track.frame_rate.to_string())
            .args(["-i", "-", "-an", "-c:v", "libx264"])
            .arg("-preset")
            .arg(&self.options.preset)
            .arg("-crf")
            .arg(self.options.crf.to_string())
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2", "-pix_fmt", "yuv420p"])
            .arg(path);
        command
    }
}

impl VideoEncoder for FfmpegEncoder {
    fn supports_video_encoding(&self) -> bool {
        self.available
    }

    fn begin(
        &self,
        path: &Path,
        track: &VideoTrack,
    ) -> Result<Box<dyn VideoSession>, EncoderError> {
        if !self.available {
            return Err(EncoderError::Unavailable);
        }
        let mut child = self
            .command(path, track)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| EncoderError::Spawn {
                program: self.options.program.clone(),
                source,
            })?;
        let stdin = child.stdin.take().map(BufWriter::new);
        let stderr = child.stderr.take().map(drain_stderr);
        debug!(pid = child.id(), path = %path.display(), "encoder started");
        Ok(Box::new(FfmpegSession {
            child: Some(child),
            stdin,
            stderr,
            size: track.size,
            frames: 0,
        }))
    }
}

// The encoder's stderr is read on its own thread so a chatty encoder cannot
// block on a full pipe while frames are still being written to stdin.
fn drain_stderr(mut pipe: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        if let Err(err) = pipe.read_to_string(&mut text) {
            debug!(error = %err, "stopped reading encoder stderr");
        }
        text
    })
}

struct FfmpegSession {
    child: Option<Child>,
    stdin: Option<BufWriter<ChildStdin>>,
    stderr: Option<JoinHandle<String>>,
    size: FrameSize,
    frames: usize,
}

impl VideoSession for FfmpegSession {
    fn add_frame(&mut self, frame: &RgbImage) -> Result<(), EncoderError> {
        let index = self.frames;
        let actual = FrameSize::new(frame.width(), frame.height());
        if actual != self.size {
            return Err(EncoderError::FrameSize {
                index,
                expected: self.size,
                actual,
            });
        }
        let stdin = self.stdin.as_mut().ok_or(EncoderError::Write {
            index,
            source: std::io::ErrorKind::BrokenPipe.into(),
        })?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|source| EncoderError::Write { index, source })?;
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), EncoderError> {
        let index = self.frames;
        if let Some(mut stdin) = self.stdin.take() {
            stdin
                .flush()
                .map_err(|source| EncoderError::Write { index, source })?;
        }
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|source| EncoderError::Write { index, source })?;
        let stderr = self.collect_stderr();
        if status.success() {
            debug!(frames = self.frames, "encoder finished");
            Ok(())
        } else {
            Err(EncoderError::Failed {
                status,
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

impl FfmpegSession {
    fn collect_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }
}

impl Drop for FfmpegSession {
    fn drop(&mut self) {
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            warn!(frames = self.frames, "abandoning unfinished video encode");
            if let Err(err) = child.kill() {
                debug!(error = %err, "encoder already exited");
            }
            let _ = child.wait();
        }
        self.collect_stderr();
    }
}
