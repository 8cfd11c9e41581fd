use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Default)]
#[command(
    name = "genrec",
    author,
    version,
    about = "Render a shader locked to a fixed real-time rate and record the frames"
)]
pub struct Args {
    /// Configuration file (default: `$GENREC_CONFIG_DIR/recorder.toml` or the
    /// platform config directory).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Render resolution (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT")]
    pub size: Option<String>,

    /// Real-time ticks per second the render loop is locked to.
    #[arg(long, value_name = "FPS", allow_negative_numbers = true)]
    pub genlock_rate: Option<f64>,

    /// Simulated frames per second; each tick advances game time by 1/rate.
    #[arg(long, value_name = "FPS")]
    pub game_rate: Option<f64>,

    /// Keep rendered frames and write them out on exit.
    #[arg(long)]
    pub record: bool,

    /// Existing directory that receives the capture.
    #[arg(long, value_name = "DIR")]
    pub movie_path: Option<PathBuf>,

    /// Number of frames to leave out at the start of the capture.
    #[arg(long, value_name = "N")]
    pub skip_first_frames: Option<u64>,

    /// Prefer MP4 output over a JPG sequence (`--video false` to disable).
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true")]
    pub video: Option<bool>,

    /// ShaderToy-style fragment shader; the built-in demo is used otherwise.
    #[arg(long, value_name = "PATH")]
    pub shader: Option<PathBuf>,

    /// Stop after this much real time (seconds or e.g. `10s`, `2m`).
    #[arg(long, value_name = "DURATION", value_parser = recconfig::parse_duration)]
    pub duration: Option<Duration>,

    /// Stop after this many frames.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub frames: Option<u64>,

    /// Do not watch the configuration file for edits.
    #[arg(long)]
    pub no_watch: bool,

    /// Validate the configuration, print it and exit.
    #[arg(long)]
    pub check_config: bool,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn parse() -> Args {
    Args::parse()
}
