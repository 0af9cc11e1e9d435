//! Core types and utilities for circle tracking.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any image type or circle detector; it only knows about
//! circles, boxes and the pixel-to-world calibration.
//!
//! ```
//! use circle_track_core::{CalibrationTransform, Rectangle, Circle};
//!
//! let calib = CalibrationTransform::identity();
//! let rect = Rectangle::from_circle(&Circle::new(40.0, 30.0, 5.0));
//! let world = calib.to_world(rect.center().x as f64, rect.center().y as f64).unwrap();
//! assert_eq!((world.x, world.y), (40.0, 30.0));
//! ```

mod calibration;
mod geometry;
mod logger;

pub use calibration::{
    CalibrationError, CalibrationTransform, ProjectionError, MIN_PROJECTIVE_SCALE,
};
pub use geometry::{Circle, Rectangle, WorldPosition};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
