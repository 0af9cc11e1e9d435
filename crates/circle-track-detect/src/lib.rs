//! Circle detection stages for the tracker.
//!
//! ## Quickstart
//!
//! ```
//! use circle_track_detect::{CircleDetector, ClusterParams, DetectionParams, RectangleClusterer};
//! use circle_track_detect::remove_occluded;
//! use circle_track_core::Rectangle;
//! use image::RgbImage;
//!
//! let frame = RgbImage::new(320, 240);
//! let detector = CircleDetector::new(DetectionParams::default());
//! let circles = remove_occluded(detector.detect(&frame), frame.width(), frame.height());
//!
//! let rects: Vec<Rectangle> = circles.iter().map(Rectangle::from_circle).collect();
//! let clusterer = RectangleClusterer::new(ClusterParams::default());
//! assert!(clusterer.cluster(&rects).is_empty());
//! ```
//!
//! Pipeline per frame:
//! 1. Convert to grayscale.
//! 2. Gaussian blur with an odd kernel size and explicit sigma.
//! 3. Canny edges with thresholds `(max(t / 2, 1), t)` and Sobel gradients.
//! 4. Every edge pixel votes along its gradient for centers at
//!    `[min_radius, max_radius]`; local accumulator maxima above the
//!    accumulator threshold become center candidates.
//! 5. Candidates closer than `2 * min_radius` to a stronger accepted circle
//!    are skipped; the rest get the radius with the densest edge support.
//! 6. Circles crossing the frame border are dropped.
//! 7. Bounding boxes are grouped; corroborated groups collapse to their mean.

mod blur;
mod cluster;
mod detector;
mod hough;
mod occlusion;
mod params;

pub use blur::{gaussian_blur, gaussian_kernel, to_grayscale};
pub use cluster::{
    group_rectangles, partition_rectangles, rectangles_similar, ClusterGroup, ClusterParams,
    RectangleClusterer,
};
pub use detector::{detect_circles, edge_map, preprocess, CircleDetector, DetectCircles};
pub use hough::hough_circles;
pub use occlusion::{is_occluded, remove_occluded, OcclusionFilter};
pub use params::{DetectionParams, ParamsError};

pub use circle_track_core::{Circle, Rectangle};
