//! Real-time tracking of circular markers on a calibrated plane.
//!
//! This crate ties the workspace together:
//! - re-exports of the geometry/calibration (`core`) and detection (`detect`) crates
//! - JSON tracker configuration and calibration files ([`config`])
//! - frame sources and publishers, the collaborators of the loop
//! - the rate-limited [`TrackingLoop`]
//! - the store watcher and the debug renderer used for tuning
//!
//! ## Quickstart
//!
//! ```no_run
//! use circle_track::{
//!     CircleDetector, FramePipeline, ImageSequenceSource, RectangleClusterer, StdoutPublisher,
//!     TrackerConfig, TrackingLoop,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = TrackerConfig::load_json("tracker.json")?;
//! let (width, height) = cfg.frame_size();
//! let calib = circle_track::load_calibration("calibration.json", width, height)?;
//!
//! let pipeline = FramePipeline::new(
//!     CircleDetector::new(cfg.detection_params()?),
//!     RectangleClusterer::new(cfg.cluster_params()?),
//!     Some(calib),
//! );
//! let source = ImageSequenceSource::open("frames/", width, height)?;
//! let mut tracker = TrackingLoop::new(pipeline, source, StdoutPublisher::stdout(), 0, 20.0)?;
//! let stats = tracker.run()?;
//! println!("{} frames", stats.frames);
//! # Ok(())
//! # }
//! ```

pub use circle_track_core as core;
pub use circle_track_detect as detect;

pub use circle_track_core::{
    init_with_level, CalibrationError, CalibrationTransform, Circle, ProjectionError, Rectangle,
    WorldPosition,
};
pub use circle_track_detect::{
    CircleDetector, ClusterParams, DetectCircles, DetectionParams, OcclusionFilter,
    RectangleClusterer,
};

pub mod config;
pub mod publish;
pub mod render;
pub mod source;
pub mod tracking;
pub mod watch;

pub use config::{load_calibration, CalibrationFile, ConfigError, TrackerConfig};
pub use publish::{
    format_positions, FramePositions, LinePublisher, PublishError, Publisher, RedisPublisher,
    StdoutPublisher,
};
pub use render::{render_debug_frame, DisplayMode};
pub use source::{Frame, ImageSequenceSource, MemorySource, SourceError, VideoSource};
pub use tracking::{
    frame_period, idle_budget, FramePipeline, FrameReport, FrameTiming, LoopStats, TrackError, TrackingLoop,
};
pub use watch::{RedisReader, StoreReader, StoreWatcher};
