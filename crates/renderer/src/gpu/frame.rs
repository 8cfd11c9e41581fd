use anyhow::{Context, Result};
use capture::{Frame, FrameAllocator, FrameReadback, FrameSize, ReadbackError};
use image::RgbaImage;

use super::pipeline::TARGET_FORMAT;

/// GPU render target that can be retained as a captured frame.
#[derive(Debug)]
pub struct GpuFrame {
    id: u64,
    size: FrameSize,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl GpuFrame {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

impl Frame for GpuFrame {
    fn size(&self) -> FrameSize {
        self.size
    }
}

/// Allocates render targets and reads them back to host memory.
#[derive(Debug, Clone)]
pub struct GpuAllocator {
    device: wgpu::Device,
    queue: wgpu::Queue,
    next_id: u64,
}

impl GpuAllocator {
    pub(crate) fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self {
            device,
            queue,
            next_id: 0,
        }
    }
}

impl FrameAllocator for GpuAllocator {
    type Frame = GpuFrame;

    fn allocate(&mut self, size: FrameSize) -> GpuFrame {
        let id = self.next_id;
        self.next_id += 1;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("render target"),
            size: extent(size),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuFrame {
            id,
            size,
            texture,
            view,
        }
    }
}

impl FrameReadback<GpuFrame> for GpuAllocator {
    fn read_rgba(&mut self, frame: &GpuFrame) -> Result<RgbaImage, ReadbackError> {
        read_texture(&self.device, &self.queue, &frame.texture, frame.size)
            .map_err(|err| ReadbackError::new(format!("{err:#}")))
    }
}

fn extent(size: FrameSize) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.width.max(1),
        height: size.height.max(1),
        depth_or_array_layers: 1,
    }
}

/// Row pitch for a texture copy; wgpu requires 256-byte aligned rows.
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/// Copies `texture` into a mappable buffer and waits for the copy.
fn read_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    size: FrameSize,
) -> Result<RgbaImage> {
    let unpadded = size.width as usize * 4;
    let padded = padded_bytes_per_row(size.width);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("readback buffer"),
        size: u64::from(padded) * u64::from(size.height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback encoder"),
    });
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded),
                rows_per_image: Some(size.height),
            },
        },
        extent(size),
    );
    queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (sender, receiver) = crossbeam_channel::bounded(1);
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device
        .poll(wgpu::PollType::Wait)
        .context("failed to wait for GPU readback")?;
    receiver
        .recv()
        .context("readback callback was dropped")?
        .context("failed to map readback buffer")?;

    let mut pixels = Vec::with_capacity(unpadded * size.height as usize);
    {
        let mapped = slice.get_mapped_range();
        for row in mapped.chunks_exact(padded as usize) {
            pixels.extend_from_slice(&row[..unpadded]);
        }
    }
    buffer.unmap();

    RgbaImage::from_raw(size.width, size.height, pixels)
        .context("readback produced a buffer of the wrong length")
}
