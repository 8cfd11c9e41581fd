use std::fmt;
use std::path::PathBuf;

use capture::FrameSize;

/// Where the fragment shader comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderSource {
    /// The built-in test pattern.
    Demo,
    /// A ShaderToy-style file defining `mainImage`.
    File(PathBuf),
}

impl ShaderSource {
    pub fn from_option(path: Option<PathBuf>) -> Self {
        path.map_or(ShaderSource::Demo, ShaderSource::File)
    }
}

impl fmt::Display for ShaderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderSource::Demo => f.write_str("built-in demo"),
            ShaderSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Adapter selection hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    Low,
    #[default]
    High,
}

/// Summary of the selected adapter, for logging.
#[derive(Debug, Clone)]
pub struct AdapterProfile {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub max_texture_dimension: u32,
}

impl AdapterProfile {
    pub(crate) fn from_wgpu(info: &wgpu::AdapterInfo, limits: &wgpu::Limits) -> Self {
        Self {
            name: info.name.clone(),
            backend: info.backend,
            device_type: info.device_type,
            max_texture_dimension: limits.max_texture_dimension_2d,
        }
    }

    pub fn is_software(&self) -> bool {
        matches!(self.device_type, wgpu::DeviceType::Cpu)
    }

    /// Whether a render target of `size` fits on this adapter.
    pub fn fits(&self, size: FrameSize) -> bool {
        size.width > 0
            && size.height > 0
            && size.width <= self.max_texture_dimension
            && size.height <= self.max_texture_dimension
    }
}

/// Start-up configuration for [`crate::OffscreenRenderer`].
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub size: FrameSize,
    pub shader: ShaderSource,
    pub power: GpuPowerPreference,
}

impl Default for RendererConfig {
    /// 1080p with the demo shader.
    fn default() -> Self {
        Self {
            size: FrameSize::new(1920, 1080),
            shader: ShaderSource::Demo,
            power: GpuPowerPreference::default(),
        }
    }
}
