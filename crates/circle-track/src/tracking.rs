//! The rate-limited detection → publication loop.
//!
//! Each iteration acquires one frame, runs detection, occlusion filtering
//! and clustering, maps cluster centers through the calibration (if any)
//! and publishes the positions. The measured iteration time includes frame
//! acquisition and the publish call. When it is shorter than the frame
//! period the loop sleeps for the rest; otherwise the next frame starts at
//! once and no catch-up is attempted.

use crate::publish::{FramePositions, PublishError, Publisher};
use crate::source::{SourceError, VideoSource};
use circle_track_core::{CalibrationError, CalibrationTransform, Rectangle, WorldPosition};
use circle_track_detect::{DetectCircles, OcclusionFilter, RectangleClusterer};
use image::RgbImage;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::instrument;

#[derive(thiserror::Error, Debug)]
pub enum TrackError {
    #[error("frame acquisition failed: {0}")]
    Source(#[from] SourceError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error("frame rate must be positive and finite (got {0})")]
    FrameRate(f64),
}

/// Start and end of one loop iteration.
#[derive(Clone, Copy, Debug)]
pub struct FrameTiming {
    pub start: Instant,
    pub end: Instant,
}

impl FrameTiming {
    pub fn elapsed(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }
}

/// Time left to sleep after an iteration that took `elapsed`.
///
/// `None` when the iteration used the whole period (or more).
#[inline]
pub fn idle_budget(elapsed: Duration, period: Duration) -> Option<Duration> {
    period.checked_sub(elapsed).filter(|d| !d.is_zero())
}

/// Frame period for a target rate.
pub fn frame_period(fps: f64) -> Result<Duration, TrackError> {
    if !(fps.is_finite() && fps > 0.0) {
        return Err(TrackError::FrameRate(fps));
    }
    Ok(Duration::from_nanos((1e9 / fps).round() as u64))
}

/// Stage counts and output of one processed frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    pub candidates: usize,
    pub visible: usize,
    pub clusters: usize,
    /// Positions lost to a degenerate projection.
    pub dropped: usize,
    pub positions: Vec<WorldPosition>,
}

/// Stateless per-frame processing: detection to world positions.
#[derive(Clone, Debug)]
pub struct FramePipeline<D> {
    detector: D,
    clusterer: RectangleClusterer,
    calibration: Option<CalibrationTransform>,
}

impl<D: DetectCircles> FramePipeline<D> {
    pub fn new(
        detector: D,
        clusterer: RectangleClusterer,
        calibration: Option<CalibrationTransform>,
    ) -> Self {
        Self {
            detector,
            clusterer,
            calibration,
        }
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn calibration(&self) -> Option<&CalibrationTransform> {
        self.calibration.as_ref()
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(width = frame.width(), height = frame.height()))
    )]
    pub fn process(&self, frame: &RgbImage) -> FrameReport {
        let circles = self.detector.detect(frame);
        let candidates = circles.len();

        let visible = OcclusionFilter::new(frame.width(), frame.height()).apply(circles);
        let rects: Vec<Rectangle> = visible.iter().map(Rectangle::from_circle).collect();
        let clusters = self.clusterer.cluster(&rects);

        let mut report = FrameReport {
            candidates,
            visible: visible.len(),
            clusters: clusters.len(),
            ..FrameReport::default()
        };
        for rect in &clusters {
            let center = rect.center();
            match &self.calibration {
                None => report.positions.push(WorldPosition::from_pixel(center)),
                Some(calib) => match calib.to_world(center.x as f64, center.y as f64) {
                    Ok(p) => report.positions.push(p),
                    Err(err) => {
                        warn!("dropping position: {err}");
                        report.dropped += 1;
                    }
                },
            }
        }
        report
    }
}

/// Counters accumulated over a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub positions: u64,
    pub publish_failures: u64,
    pub dropped_positions: u64,
    /// Iterations that used up the whole frame period.
    pub overruns: u64,
}

/// Runs [`FramePipeline`] over a [`VideoSource`] and hands each result to a
/// [`Publisher`], one frame at a time.
pub struct TrackingLoop<D, S, P> {
    pipeline: FramePipeline<D>,
    source: S,
    publisher: P,
    camera_id: u32,
    period: Duration,
    stop: Arc<AtomicBool>,
    max_frames: Option<u64>,
}

impl<D, S, P> TrackingLoop<D, S, P>
where
    D: DetectCircles,
    S: VideoSource,
    P: Publisher,
{
    /// Fails when `fps` is not a positive rate or the calibration is
    /// unusable on the source's frame size.
    pub fn new(
        pipeline: FramePipeline<D>,
        source: S,
        publisher: P,
        camera_id: u32,
        fps: f64,
    ) -> Result<Self, TrackError> {
        let period = frame_period(fps)?;
        if let Some(calib) = pipeline.calibration() {
            calib.validate_for_frame(source.width(), source.height())?;
        }
        Ok(Self {
            pipeline,
            source,
            publisher,
            camera_id,
            period,
            stop: Arc::new(AtomicBool::new(false)),
            max_frames: None,
        })
    }

    /// Share an external stop flag; the loop exits before the next frame
    /// once it is set.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    pub fn into_publisher(self) -> P {
        self.publisher
    }

    /// Process frames until the source ends, the stop flag is set, or the
    /// frame limit is reached. Acquisition errors end the run with an error.
    pub fn run(&mut self) -> Result<LoopStats, TrackError> {
        let mut stats = LoopStats::default();
        info!(
            "tracking camera {} at {:.1} fps",
            self.camera_id,
            1.0 / self.period.as_secs_f64()
        );

        loop {
            if self.stop.load(Ordering::Relaxed) {
                info!("stop requested");
                break;
            }
            if self.max_frames.is_some_and(|max| stats.frames >= max) {
                break;
            }

            let start = Instant::now();
            let Some(timing) = self.step(start, &mut stats)? else {
                info!("end of stream");
                break;
            };

            match idle_budget(timing.elapsed(), self.period) {
                Some(idle) => thread::sleep(idle),
                None => {
                    stats.overruns += 1;
                    warn!(
                        "frame took {:.1} ms, over the {:.1} ms period",
                        timing.elapsed().as_secs_f64() * 1e3,
                        self.period.as_secs_f64() * 1e3
                    );
                }
            }
        }

        info!(
            "processed {} frames, published {} positions ({} publish failures)",
            stats.frames, stats.positions, stats.publish_failures
        );
        Ok(stats)
    }

    // One acquire/process/publish iteration; `None` at end of stream.
    fn step(
        &mut self,
        start: Instant,
        stats: &mut LoopStats,
    ) -> Result<Option<FrameTiming>, TrackError> {
        let Some(frame) = self.source.read_frame()? else {
            return Ok(None);
        };
        let report = self.pipeline.process(&frame.image);

        let message = FramePositions {
            camera_id: self.camera_id,
            timestamp_ms: frame.timestamp_ms,
            positions: report.positions,
        };
        if let Err(err) = self.publisher.publish(&message) {
            log_publish_failure(&err);
            stats.publish_failures += 1;
        }

        let timing = FrameTiming {
            start,
            end: Instant::now(),
        };
        stats.frames += 1;
        stats.positions += message.positions.len() as u64;
        stats.dropped_positions += report.dropped as u64;
        debug!(
            "frame {}: {} candidates, {} visible, {} clusters, {} positions in {:.2} ms",
            stats.frames,
            report.candidates,
            report.visible,
            report.clusters,
            message.positions.len(),
            timing.elapsed().as_secs_f64() * 1e3
        );
        Ok(Some(timing))
    }
}

fn log_publish_failure(err: &PublishError) {
    warn!("publish failed: {err}");
}
