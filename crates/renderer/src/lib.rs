//! Headless ShaderToy renderer for genlocked capture.
//!
//! ```text
//!   Recorder::begin_frame ──▶ FrameTime ──▶ OffscreenRenderer::render
//!                                                 │ uniforms (iTime = simulated)
//!                                                 ▼
//!                                       GpuFrame (render target)
//!                                                 │ retained by the capture sink
//!                                                 ▼
//!                              GpuAllocator::read_rgba ──▶ export
//! ```
//!
//! Fragment shaders use ShaderToy conventions (`mainImage`, `iTime`,
//! `iResolution`, ...). They are wrapped at runtime so they compile as
//! Vulkan GLSL through naga. Render targets are plain RGBA8 textures; the
//! capture sink decides which ones are kept.

mod compile;
mod gpu;
mod renderer;
mod types;

pub use compile::DEMO_SHADER;
pub use gpu::{GpuAllocator, GpuFrame};
pub use renderer::OffscreenRenderer;
pub use types::{AdapterProfile, GpuPowerPreference, RendererConfig, ShaderSource};
