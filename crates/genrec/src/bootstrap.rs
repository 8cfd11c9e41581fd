use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use capture::{CaptureSettings, FfmpegOptions, FrameSize, RecorderOptions};
use genlock::{GenlockConfig, TimingThresholds};
use recconfig::RecorderConfig;
use renderer::{GpuPowerPreference, RendererConfig, ShaderSource};
use tracing::debug;

use crate::cli::Args;

/// Command-line values that take precedence over the configuration file,
/// including after a live reload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub size: Option<(u32, u32)>,
    pub genlock_rate: Option<f64>,
    pub game_rate: Option<f64>,
    pub record: bool,
    pub movie_path: Option<PathBuf>,
    pub skip_first_frames: Option<u64>,
    pub video: Option<bool>,
    pub shader: Option<PathBuf>,
}

impl Overrides {
    pub fn from_args(args: &Args) -> Result<Self> {
        let size = args
            .size
            .as_deref()
            .map(parse_surface_size)
            .transpose()?;
        Ok(Self {
            size,
            genlock_rate: args.genlock_rate,
            game_rate: args.game_rate,
            record: args.record,
            movie_path: args.movie_path.clone(),
            skip_first_frames: args.skip_first_frames,
            video: args.video,
            shader: args.shader.clone(),
        })
    }

    pub fn apply(&self, config: &mut RecorderConfig) {
        if let Some((width, height)) = self.size {
            config.width = width;
            config.height = height;
        }
        if let Some(rate) = self.genlock_rate {
            config.genlock_rate = rate;
        }
        if let Some(rate) = self.game_rate {
            config.game_time_rate = rate;
        }
        if self.record {
            config.record = true;
        }
        if let Some(path) = &self.movie_path {
            config.movie_path = Some(path.clone());
        }
        if let Some(frames) = self.skip_first_frames {
            config.skip_first_frames = frames;
        }
        if let Some(video) = self.video {
            config.prefer_video_encoding = video;
        }
        if let Some(shader) = &self.shader {
            config.shader = Some(shader.clone());
        }
    }
}

/// Loads `path` (or the defaults when it does not exist), applies the
/// overrides and validates the result.
pub fn load_config(path: &Path, overrides: &Overrides) -> Result<RecorderConfig> {
    let mut config = RecorderConfig::load_or_default(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    if path.exists() {
        debug!(path = %path.display(), "loaded config file");
    } else {
        debug!(path = %path.display(), "no config file; using defaults");
    }
    overrides.apply(&mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}

pub fn parse_surface_size(spec: &str) -> Result<(u32, u32)> {
    let trimmed = spec.trim();
    let (width, height) = trimmed
        .split_once(['x', 'X', '×'])
        .ok_or_else(|| anyhow!("expected WxH format, e.g. 1920x1080"))?;

    let width: u32 = width
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid width in size specification"))?;
    let height: u32 = height
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid height in size specification"))?;

    if width == 0 || height == 0 {
        bail!("surface dimensions must be greater than zero");
    }

    Ok((width, height))
}

pub fn frame_size(config: &RecorderConfig) -> FrameSize {
    FrameSize::new(config.width, config.height)
}

pub fn genlock_config(config: &RecorderConfig) -> GenlockConfig {
    GenlockConfig::from_rates(config.genlock_rate, config.game_time_rate)
}

pub fn thresholds(config: &RecorderConfig) -> TimingThresholds {
    TimingThresholds {
        safety_margin: config.timing.safety_margin,
        overshoot_fraction: config.timing.overshoot_fraction,
        drop_fraction: config.timing.drop_fraction,
    }
}

pub fn capture_settings(config: &RecorderConfig) -> CaptureSettings {
    CaptureSettings {
        enabled: config.record,
        output_path: config.movie_path.clone().unwrap_or_default(),
        skip_first: config.skip_first_frames,
        prefer_video_encoding: config.prefer_video_encoding,
    }
}

pub fn encoder_options(config: &RecorderConfig) -> FfmpegOptions {
    FfmpegOptions {
        program: config.encoder.program.clone(),
        preset: config.encoder.preset.clone(),
        crf: config.encoder.crf,
    }
}

pub fn shader_source(config: &RecorderConfig) -> ShaderSource {
    ShaderSource::from_option(config.shader.clone())
}

pub fn renderer_config(config: &RecorderConfig) -> RendererConfig {
    RendererConfig {
        size: frame_size(config),
        shader: shader_source(config),
        power: GpuPowerPreference::High,
    }
}

pub fn recorder_options(config: &RecorderConfig) -> RecorderOptions {
    RecorderOptions {
        genlock: genlock_config(config),
        thresholds: thresholds(config),
        capture: capture_settings(config),
        size: frame_size(config),
        stats_smoothing: config.stats_smoothing,
    }
}
