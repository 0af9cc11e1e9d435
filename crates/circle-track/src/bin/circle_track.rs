//! circle-track CLI: track markers, watch the store, tune detection.

use circle_track::{
    frame_period, init_with_level, load_calibration, render_debug_frame, CircleDetector,
    ClusterParams, DetectionParams, DisplayMode, FramePipeline, ImageSequenceSource,
    LinePublisher, Publisher, RectangleClusterer, RedisPublisher, RedisReader, StoreWatcher,
    TrackerConfig, TrackingLoop,
};
use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "circle-track")]
#[command(about = "Track circular markers and publish their plane coordinates")]
#[command(version)]
struct Cli {
    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    /// Log through `tracing` with JSON output.
    #[cfg(feature = "tracing")]
    #[arg(long, global = true)]
    json_log: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tracking loop over a directory of frames.
    Track(TrackArgs),

    /// Poll the store and print the published positions.
    Watch(WatchArgs),

    /// Detect circles in one image (parameter tuning).
    Detect(DetectArgs),
}

#[derive(Debug, Clone, Args)]
struct TrackArgs {
    /// Tracker configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Calibration file (JSON with an "H" matrix). Without it pixel
    /// centers are published.
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Directory of frames, played back in file-name order.
    #[arg(long)]
    frames: PathBuf,

    /// Camera id; positions go to key `camera<id>`.
    #[arg(long, default_value_t = 0)]
    camera: u32,

    /// Target frame rate.
    #[arg(long, default_value_t = 20.0)]
    fps: f64,

    /// Key-value store URL.
    #[arg(long, default_value = "redis://127.0.0.1:6379")]
    store: String,

    /// Print `<timestamp_ms> x0 y0 ...` lines instead of writing to the store.
    #[arg(long)]
    stdout: bool,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct WatchArgs {
    #[arg(long, default_value_t = 0)]
    camera: u32,

    #[arg(long, default_value = "redis://127.0.0.1:6379")]
    store: String,

    /// Poll interval in milliseconds.
    #[arg(long, default_value_t = 300)]
    interval_ms: u64,

    /// Stop after this many polls.
    #[arg(long)]
    max_polls: Option<u64>,
}

#[derive(Debug, Clone, Args)]
struct DetectArgs {
    /// Input image.
    #[arg(long)]
    image: PathBuf,

    /// Start from a tracker configuration; explicit flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    blur_size: Option<u32>,
    #[arg(long)]
    blur_sigma: Option<f64>,
    #[arg(long)]
    canny_threshold: Option<f32>,
    #[arg(long)]
    min_radius: Option<u32>,
    #[arg(long)]
    max_radius: Option<u32>,
    #[arg(long)]
    accumulator_threshold: Option<f32>,
    #[arg(long)]
    min_group_size: Option<usize>,
    #[arg(long)]
    group_tolerance: Option<f32>,

    /// Stage shown in the rendered image: original, blurred or edges.
    #[arg(long, default_value = "original")]
    mode: DisplayMode,

    /// Write the rendered image (PNG) here.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write the effective parameters as a tracker configuration.
    #[arg(long)]
    write_config: Option<PathBuf>,
}

impl DetectArgs {
    fn to_config(&self, width: u32, height: u32) -> CliResult<TrackerConfig> {
        let mut cfg = match &self.config {
            Some(path) => TrackerConfig::load_json(path)?,
            None => TrackerConfig::from_params(
                width,
                height,
                &DetectionParams::default(),
                &ClusterParams::default(),
            ),
        };
        cfg.image_width_px = width;
        cfg.image_height_px = height;
        if let Some(v) = self.blur_size {
            cfg.blur_size = v;
        }
        if let Some(v) = self.blur_sigma {
            cfg.blur_sigma = v;
        }
        if let Some(v) = self.canny_threshold {
            cfg.canny_threshold = v;
        }
        if let Some(v) = self.min_radius {
            cfg.min_radius = v;
        }
        if let Some(v) = self.max_radius {
            cfg.max_radius = v;
        }
        if let Some(v) = self.accumulator_threshold {
            cfg.accumulator_threshold = v;
        }
        if let Some(v) = self.min_group_size {
            cfg.min_group_size = v;
        }
        if let Some(v) = self.group_tolerance {
            cfg.group_tolerance = v;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

// ── track ──────────────────────────────────────────────────────────────

fn run_track(args: &TrackArgs) -> CliResult<()> {
    let cfg = TrackerConfig::load_json(&args.config)?;
    cfg.validate()?;
    let (width, height) = cfg.frame_size();

    let calibration = match &args.calibration {
        Some(path) => Some(load_calibration(path, width, height)?),
        None => {
            log::warn!("no calibration given; publishing pixel coordinates");
            None
        }
    };
    let pipeline = FramePipeline::new(
        CircleDetector::new(cfg.detection_params()?),
        RectangleClusterer::new(cfg.cluster_params()?),
        calibration,
    );
    let source = ImageSequenceSource::open(&args.frames, width, height)?;
    let publisher: Box<dyn Publisher> = if args.stdout {
        Box::new(LinePublisher::new(std::io::stdout()))
    } else {
        // A frame that waits longer than one period on the store is late anyway.
        Box::new(RedisPublisher::open(&args.store)?.with_timeout(frame_period(args.fps)?))
    };

    let mut tracker = TrackingLoop::new(pipeline, source, publisher, args.camera, args.fps)?;
    if let Some(max) = args.max_frames {
        tracker = tracker.with_max_frames(max);
    }
    let stats = tracker.run()?;
    log::info!(
        "{} frames, {} overruns, {} dropped positions",
        stats.frames,
        stats.overruns,
        stats.dropped_positions
    );
    Ok(())
}

// ── watch ──────────────────────────────────────────────────────────────

fn run_watch(args: &WatchArgs) -> CliResult<()> {
    let reader = RedisReader::open(&args.store)?;
    let mut watcher =
        StoreWatcher::new(reader, args.camera).with_interval(Duration::from_millis(args.interval_ms));
    if let Some(max) = args.max_polls {
        watcher = watcher.with_max_polls(max);
    }
    let stats = watcher.run(&mut std::io::stdout().lock())?;
    log::info!(
        "{} polls, {} malformed values, {} store errors",
        stats.polls,
        stats.malformed,
        stats.errors
    );
    Ok(())
}

// ── detect ─────────────────────────────────────────────────────────────

fn run_detect(args: &DetectArgs) -> CliResult<()> {
    let img = image::open(&args.image)
        .map_err(|e| -> CliError { format!("failed to open image {}: {e}", args.image.display()).into() })?
        .to_rgb8();
    let (width, height) = img.dimensions();
    log::info!("image size: {width}x{height}");

    let cfg = args.to_config(width, height)?;
    let params = cfg.detection_params()?;
    let circles = CircleDetector::new(params.clone()).detect(&img);
    log::info!("detected {} circles", circles.len());
    for c in &circles {
        println!("{:.1} {:.1} {:.1}", c.x, c.y, c.radius);
    }

    if let Some(out) = &args.out {
        render_debug_frame(&img, args.mode, &params, &circles).save(out)?;
        log::info!("rendered {:?} view written to {}", args.mode, out.display());
    }
    if let Some(path) = &args.write_config {
        cfg.write_json(path)?;
        log::info!("configuration written to {}", path.display());
    }
    Ok(())
}

#[cfg(feature = "tracing")]
fn init_logging(cli: &Cli) -> CliResult<()> {
    if cli.json_log {
        circle_track::core::init_tracing(true)?;
        return Ok(());
    }
    init_with_level(cli.log_level)?;
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_logging(cli: &Cli) -> CliResult<()> {
    init_with_level(cli.log_level)?;
    Ok(())
}

fn run(cli: &Cli) -> CliResult<()> {
    init_logging(cli)?;
    match &cli.command {
        Commands::Track(args) => run_track(args),
        Commands::Watch(args) => run_watch(args),
        Commands::Detect(args) => run_detect(args),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(&cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
