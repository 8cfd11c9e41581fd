use std::fmt;

use image::RgbaImage;

/// Pixel dimensions of a frame. Frames are always RGBA8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A rendered image buffer, usually GPU resident.
pub trait Frame {
    fn size(&self) -> FrameSize;
}

/// Creates fresh render targets.
///
/// Every call must return a new buffer; the capture sink relies on this to
/// keep retained frames from being rendered over.
pub trait FrameAllocator {
    type Frame: Frame;

    fn allocate(&mut self, size: FrameSize) -> Self::Frame;
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ReadbackError {
    message: String,
}

impl ReadbackError {
    pub fn new(message: impl fmt::Display) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// Copies a frame's pixels into host memory.
pub trait FrameReadback<F> {
    fn read_rgba(&mut self, frame: &F) -> Result<RgbaImage, ReadbackError>;
}

/// Owned slot holding the frame the renderer draws into next.
#[derive(Debug)]
pub struct RenderTarget<F> {
    frame: Option<F>,
}

impl<F> RenderTarget<F> {
    pub fn empty() -> Self {
        Self { frame: None }
    }

    pub fn get(&self) -> Option<&F> {
        self.frame.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.is_none()
    }

    /// Moves the current frame out, leaving the slot empty.
    pub fn take(&mut self) -> Option<F> {
        self.frame.take()
    }

    pub fn get_or_insert_with(&mut self, allocate: impl FnOnce() -> F) -> &mut F {
        self.frame.get_or_insert_with(allocate)
    }

    /// Installs `frame`, releasing the previous buffer before returning.
    pub fn replace(&mut self, frame: F) {
        drop(self.frame.replace(frame));
    }
}

impl<F> Default for RenderTarget<F> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Host-memory frame, used for offline rendering and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct CpuFrame {
    id: u64,
    pixels: RgbaImage,
}

impl CpuFrame {
    /// Allocation id, unique per [`CpuAllocator`].
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut RgbaImage {
        &mut self.pixels
    }

    /// Replaces the pixel buffer, e.g. to emulate an external resize.
    pub fn set_pixels(&mut self, pixels: RgbaImage) {
        self.pixels = pixels;
    }
}

impl Frame for CpuFrame {
    fn size(&self) -> FrameSize {
        FrameSize::new(self.pixels.width(), self.pixels.height())
    }
}

#[derive(Debug, Default)]
pub struct CpuAllocator {
    next_id: u64,
}

impl CpuAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames allocated so far.
    pub fn allocated(&self) -> u64 {
        self.next_id
    }
}

impl FrameAllocator for CpuAllocator {
    type Frame = CpuFrame;

    fn allocate(&mut self, size: FrameSize) -> CpuFrame {
        let id = self.next_id;
        self.next_id += 1;
        CpuFrame {
            id,
            pixels: RgbaImage::new(size.width, size.height),
        }
    }
}

impl FrameReadback<CpuFrame> for CpuAllocator {
    fn read_rgba(&mut self, frame: &CpuFrame) -> Result<RgbaImage, ReadbackError> {
        Ok(frame.pixels.clone())
    }
}
