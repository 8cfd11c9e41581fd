use std::fs;

use anyhow::{bail, Context, Result};
use capture::{Frame, FrameSize, FrameTime};
use chrono::{DateTime, Local};
use wgpu::util::DeviceExt;

use crate::compile::DEMO_SHADER;
use crate::gpu::{
    GpuAllocator, GpuContext, GpuFrame, PipelineLayouts, ShaderPipeline, ShadertoyUniforms,
};
use crate::types::{RendererConfig, ShaderSource};

/// Draws a ShaderToy-style fragment shader into offscreen render targets.
pub struct OffscreenRenderer {
    context: GpuContext,
    layouts: PipelineLayouts,
    pipeline: ShaderPipeline,
    shader: ShaderSource,
    uniforms: ShadertoyUniforms,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    started: DateTime<Local>,
}

impl OffscreenRenderer {
    pub fn new(config: &RendererConfig) -> Result<Self> {
        let context = GpuContext::new(config.power)?;
        if !context.adapter_profile.fits(config.size) {
            bail!(
                "GPU max texture dimension is {max}, requested target is {size}",
                max = context.adapter_profile.max_texture_dimension,
                size = config.size
            );
        }

        let layouts = PipelineLayouts::new(&context.device)?;
        let code = load_shader(&config.shader)?;
        let pipeline = ShaderPipeline::new(&context.device, &layouts, &code)?;

        let uniforms = ShadertoyUniforms::new(config.size);
        let uniform_buffer = context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("uniform buffer"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        let uniform_bind_group = context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("uniform bind group"),
                layout: &layouts.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                }],
            });

        tracing::info!(
            adapter = %context.adapter_profile.name,
            shader = %config.shader,
            size = %config.size,
            "renderer ready"
        );

        Ok(Self {
            context,
            layouts,
            pipeline,
            shader: config.shader.clone(),
            uniforms,
            uniform_buffer,
            uniform_bind_group,
            started: Local::now(),
        })
    }

    /// Whether render targets of `size` can be allocated.
    pub fn supports_size(&self, size: FrameSize) -> bool {
        self.context.adapter_profile.fits(size)
    }

    /// Allocator sharing this renderer's device.
    pub fn allocator(&self) -> GpuAllocator {
        GpuAllocator::new(self.context.device.clone(), self.context.queue.clone())
    }

    /// Swaps in a new shader. On failure the current shader stays active.
    pub fn set_shader(&mut self, shader: ShaderSource) -> Result<()> {
        if shader == self.shader {
            return Ok(());
        }
        let code = load_shader(&shader)?;
        self.pipeline = ShaderPipeline::new(&self.context.device, &self.layouts, &code)?;
        tracing::info!(shader = %shader, "shader reloaded");
        self.shader = shader;
        Ok(())
    }

    /// Renders one frame at simulated time `time` into `target`.
    pub fn render(&mut self, target: &GpuFrame, time: &FrameTime) -> Result<()> {
        self.uniforms.update(target.size(), time, self.started);
        self.context.queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&self.uniforms),
        );

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("frame encoder"),
                });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shader pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.view(),
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline.pipeline);
            pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.context.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}

fn load_shader(source: &ShaderSource) -> Result<String> {
    match source {
        ShaderSource::Demo => Ok(DEMO_SHADER.to_string()),
        ShaderSource::File(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read shader at {}", path.display())),
    }
}
