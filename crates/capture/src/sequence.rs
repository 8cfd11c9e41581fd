use crate::frame::{Frame, FrameSize};

/// Ordered, owned list of retained frames. Every frame has the same size.
#[derive(Debug)]
pub struct FrameSequence<F> {
    frames: Vec<F>,
    size: Option<FrameSize>,
}

impl<F: Frame> FrameSequence<F> {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            size: None,
        }
    }

    /// Appends `frame`, or hands it back if its size differs from the frames
    /// already retained.
    pub fn push(&mut self, frame: F) -> Result<(), F> {
        let size = frame.size();
        match self.size {
            Some(expected) if expected != size => Err(frame),
            _ => {
                self.size = Some(size);
                self.frames.push(frame);
                Ok(())
            }
        }
    }

    /// Whether a frame of `size` would be accepted.
    pub fn accepts(&self, size: FrameSize) -> bool {
        self.size.map_or(true, |expected| expected == size)
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Size shared by every frame, once one has been retained.
    pub fn size(&self) -> Option<FrameSize> {
        self.size
    }

    pub fn last(&self) -> Option<&F> {
        self.frames.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, F> {
        self.frames.iter()
    }
}

impl<F: Frame> Default for FrameSequence<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> IntoIterator for FrameSequence<F> {
    type Item = F;
    type IntoIter = std::vec::IntoIter<F>;

    fn into_iter(self) -> Self::IntoIter {
        self.frames.into_iter()
    }
}
