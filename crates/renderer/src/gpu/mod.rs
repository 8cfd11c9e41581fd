//! Offscreen GPU plumbing.
//!
//! - `context` owns the wgpu instance, device and queue. There is no surface.
//! - `pipeline` compiles wrapped GLSL into a render pipeline with a single
//!   uniform bind group.
//! - `uniforms` mirrors the injected ShaderToy uniform block.
//! - `frame` allocates render-target textures and reads them back.

mod context;
mod frame;
mod pipeline;
mod uniforms;

pub(crate) use context::GpuContext;
pub use frame::{GpuAllocator, GpuFrame};
pub(crate) use pipeline::{PipelineLayouts, ShaderPipeline};
pub(crate) use uniforms::ShadertoyUniforms;
