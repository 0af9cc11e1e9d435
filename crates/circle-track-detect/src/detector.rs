use circle_track_core::Circle;
use image::{GrayImage, RgbImage};
use log::debug;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::blur::{gaussian_blur, to_grayscale};
use crate::hough::hough_circles;
use crate::DetectionParams;

/// Anything that turns a color frame into circle candidates.
///
/// The tracking loop is generic over this so detection can be swapped
/// (or scripted in tests) without touching the rest of the pipeline.
pub trait DetectCircles {
    fn detect(&self, frame: &RgbImage) -> Vec<Circle>;
}

/// Grayscale + blur stage.
pub fn preprocess(frame: &RgbImage, params: &DetectionParams) -> GrayImage {
    let gray = to_grayscale(frame);
    gaussian_blur(&gray, params.effective_kernel_size(), params.blur_sigma)
}

/// Canny edges of an already blurred image.
pub fn edge_map(blurred: &GrayImage, params: &DetectionParams) -> GrayImage {
    imageproc::edges::canny(blurred, params.canny_low(), params.canny_high())
}

/// Run the full detection on one frame with explicit parameters.
///
/// An empty result is a normal outcome, not an error.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(width = frame.width(), height = frame.height()))
)]
pub fn detect_circles(frame: &RgbImage, params: &DetectionParams) -> Vec<Circle> {
    let blurred = preprocess(frame, params);
    let edges = edge_map(&blurred, params);
    let circles = hough_circles(&blurred, &edges, params);
    debug!(
        "detected {} circle candidates in {}x{} frame",
        circles.len(),
        frame.width(),
        frame.height()
    );
    circles
}

/// Hough circle detector holding its current parameters.
#[derive(Clone, Debug, Default)]
pub struct CircleDetector {
    params: DetectionParams,
}

impl CircleDetector {
    pub fn new(params: DetectionParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &DetectionParams {
        &self.params
    }

    /// Replace the parameters; the next `detect` call uses them.
    pub fn set_params(&mut self, params: DetectionParams) {
        self.params = params;
    }

    pub fn detect(&self, frame: &RgbImage) -> Vec<Circle> {
        detect_circles(frame, &self.params)
    }
}

impl DetectCircles for CircleDetector {
    fn detect(&self, frame: &RgbImage) -> Vec<Circle> {
        CircleDetector::detect(self, frame)
    }
}
