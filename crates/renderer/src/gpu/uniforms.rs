use bytemuck::{Pod, Zeroable};
use capture::{FrameSize, FrameTime};
use chrono::{DateTime, Datelike, Local, Timelike};

/// std140 mirror of the `ShaderParams` block in the GLSL prelude.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct ShadertoyUniforms {
    pub i_resolution: [f32; 3],
    pub i_time: f32,
    pub i_time_delta: f32,
    pub i_frame: i32,
    pub i_frame_rate: f32,
    pub i_sample_rate: f32,
    pub i_mouse: [f32; 4],
    pub i_date: [f32; 4],
}

impl ShadertoyUniforms {
    pub fn new(size: FrameSize) -> Self {
        Self {
            i_resolution: [size.width as f32, size.height as f32, 1.0],
            i_time: 0.0,
            i_time_delta: 0.0,
            i_frame: 0,
            i_frame_rate: 0.0,
            i_sample_rate: 44100.0,
            i_mouse: [0.0; 4],
            i_date: [0.0; 4],
        }
    }

    /// Feeds simulated time; the wall clock only drives `iDate`.
    pub fn update(&mut self, size: FrameSize, time: &FrameTime, started: DateTime<Local>) {
        self.i_resolution = [size.width as f32, size.height as f32, 1.0];
        self.i_time = time.time as f32;
        self.i_time_delta = time.delta as f32;
        self.i_frame = time.frame.min(i32::MAX as u64) as i32;
        self.i_frame_rate = if time.delta > 0.0 {
            (1.0 / time.delta) as f32
        } else {
            0.0
        };
        self.i_date = date_at(started, time.time);
    }
}

/// `iDate` for a point `seconds` of simulated time after `started`, so a
/// captured clock matches the capture rather than the render wall time.
fn date_at(started: DateTime<Local>, seconds: f64) -> [f32; 4] {
    let offset = chrono::Duration::microseconds((seconds.max(0.0) * 1e6) as i64);
    let now = started + offset;
    let seconds_since_midnight =
        now.num_seconds_from_midnight() as f32 + now.nanosecond() as f32 / 1_000_000_000.0;
    [
        now.year() as f32,
        now.month() as f32,
        now.day() as f32,
        seconds_since_midnight,
    ]
}
