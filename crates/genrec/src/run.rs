use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use capture::{FfmpegEncoder, Recorder, RecorderCounters};
use genlock::{MonotonicClock, RealClock};
use recconfig::RecorderConfig;
use renderer::{GpuAllocator, OffscreenRenderer};
use tracing_subscriber::EnvFilter;

use crate::bootstrap::{self, Overrides};
use crate::cli::Args;
use crate::live::LiveConfig;
use crate::paths::resolve_config_file;

const STATS_INTERVAL: Duration = Duration::from_secs(1);

type GenlockedRecorder = Recorder<GpuAllocator, MonotonicClock>;

pub fn run(args: Args) -> Result<()> {
    initialise_tracing(args.verbose);

    let config_path = resolve_config_file(args.config.as_deref())?;
    let overrides = Overrides::from_args(&args)?;
    let config = bootstrap::load_config(&config_path, &overrides)?;
    tracing::debug!(config = %config_path.display(), "resolved configuration file");

    if args.check_config {
        let rendered = config
            .to_toml_string()
            .context("failed to serialise configuration")?;
        println!("# {}", config_path.display());
        print!("{rendered}");
        return Ok(());
    }

    let encoder = FfmpegEncoder::detect(bootstrap::encoder_options(&config));
    let mut renderer = OffscreenRenderer::new(&bootstrap::renderer_config(&config))
        .context("failed to initialise renderer")?;
    let mut recorder = Recorder::new(
        MonotonicClock::new(),
        renderer.allocator(),
        bootstrap::recorder_options(&config),
    );
    let mut live = (!args.no_watch).then(|| LiveConfig::new(config_path, overrides, config));
    if let Some(live) = live.as_ref() {
        tracing::debug!(path = %live.path().display(), "watching config file for edits");
    }

    let bounded = args.frames.is_some() || args.duration.is_some();
    let stop = Arc::new(AtomicBool::new(false));
    if !bounded {
        spawn_stop_listener(Arc::clone(&stop));
        tracing::info!("running until enter is pressed or stdin closes");
    }

    tracing::info!(
        genlock_rate = recorder.genlock().effective_rate(),
        size = %recorder.size(),
        record = recorder.settings().enabled,
        "genlocked render loop started"
    );

    let started = Instant::now();
    let mut last_stats = started;
    loop {
        let time = recorder.begin_frame();
        if let Err(err) = renderer.render(recorder.render_target(), &time) {
            tracing::error!("render failed: {err:#}");
        }
        recorder.end_frame();

        let now = Instant::now();
        if now.duration_since(last_stats) >= STATS_INTERVAL {
            log_stats(&recorder);
            last_stats = now;
        }

        if let Some(live) = live.as_mut() {
            let previous = live.current().clone();
            if let Some(updated) = live.poll(now) {
                apply_live(&mut recorder, &mut renderer, &previous, &updated);
            }
        }

        if stop.load(Ordering::Relaxed) {
            tracing::info!("stop requested");
            break;
        }
        if args.frames.is_some_and(|limit| time.frame + 1 >= limit) {
            break;
        }
        if args
            .duration
            .is_some_and(|limit| now.duration_since(started) >= limit)
        {
            break;
        }
    }

    let counters = recorder.counters();
    log_summary(counters, recorder.clock().now());

    match recorder.finish().export(Some(&encoder)) {
        Ok(Some(report)) => {
            tracing::info!(
                frames = report.frames,
                location = %report.location.display(),
                mode = ?report.mode,
                degraded = report.degraded,
                "capture exported"
            );
            Ok(())
        }
        Ok(None) => {
            tracing::debug!("recording disabled; nothing exported");
            Ok(())
        }
        Err(err) => {
            tracing::error!("{err}");
            Err(err).context("failed to export capture")
        }
    }
}

fn initialise_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn spawn_stop_listener(stop: Arc<AtomicBool>) {
    thread::spawn(move || {
        // Any line, end of input or a read error ends the run.
        let mut line = String::new();
        let _ = io::stdin().lock().read_line(&mut line);
        stop.store(true, Ordering::Relaxed);
    });
}

fn log_stats(recorder: &GenlockedRecorder) {
    let stats = recorder.stats();
    if !stats.is_ready() {
        return;
    }
    tracing::debug!(
        render_fps = format_args!("{:.2}", stats.render_fps()),
        game_fps = format_args!("{:.2}", stats.game_fps()),
        render_ms = format_args!("{:.2}", stats.render_frame_time().as_secs_f64() * 1000.0),
        game_ms = format_args!("{:.2}", stats.game_frame_time().as_secs_f64() * 1000.0),
        captured = recorder.captured(),
        "render stats"
    );
}

fn log_summary(counters: RecorderCounters, elapsed: f64) {
    tracing::info!(
        frames = counters.frames,
        drops = counters.drops,
        overshoots = counters.overshoots,
        rate_resets = counters.rate_resets,
        elapsed = format_args!("{elapsed:.2}s"),
        "render loop stopped"
    );
}

/// Pushes a reloaded configuration into the running loop. Settings that
/// cannot change mid-run are logged and left alone.
fn apply_live(
    recorder: &mut GenlockedRecorder,
    renderer: &mut OffscreenRenderer,
    previous: &RecorderConfig,
    updated: &RecorderConfig,
) {
    for key in previous.changed_keys(updated) {
        match key {
            "genlock_rate" | "game_time_rate" => {
                recorder.set_genlock(bootstrap::genlock_config(updated));
            }
            "timing" => recorder.set_thresholds(bootstrap::thresholds(updated)),
            "record" | "movie_path" | "skip_first_frames" | "prefer_video_encoding" => {
                recorder.set_settings(bootstrap::capture_settings(updated));
            }
            "stats_smoothing" => recorder.set_stats_smoothing(updated.stats_smoothing),
            "resolution" => {
                let size = bootstrap::frame_size(updated);
                if !renderer.supports_size(size) {
                    tracing::warn!(%size, "resolution exceeds GPU limits; keeping current size");
                } else {
                    recorder.set_size(size);
                }
            }
            "shader" => {
                if let Err(err) = renderer.set_shader(bootstrap::shader_source(updated)) {
                    tracing::warn!("keeping current shader: {err:#}");
                }
            }
            "encoder" => tracing::info!("encoder settings apply on restart"),
            other => tracing::debug!(key = other, "no live handler"),
        }
    }
}
