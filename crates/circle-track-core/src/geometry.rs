use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A detected circle in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub x: f32,
    pub y: f32,
    pub radius: f32,
}

impl Circle {
    pub fn new(x: f32, y: f32, radius: f32) -> Self {
        Self { x, y, radius }
    }

    #[inline]
    pub fn center(&self) -> Point2<f32> {
        Point2::new(self.x, self.y)
    }
}

/// Axis-aligned box in pixel coordinates, anchored at its top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rectangle {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The square that bounds `circle`: side `2r`, top-left at `(x - r, y - r)`.
    pub fn from_circle(circle: &Circle) -> Self {
        let side = 2.0 * circle.radius;
        Self::new(circle.x - circle.radius, circle.y - circle.radius, side, side)
    }

    #[inline]
    pub fn center(&self) -> Point2<f32> {
        Point2::new(self.x + 0.5 * self.width, self.y + 0.5 * self.height)
    }
}

/// Position on the world plane, in calibration units.
///
/// When no calibration is configured the tracker publishes raw pixel
/// centers through this same type.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldPosition {
    pub x: f64,
    pub y: f64,
}

impl WorldPosition {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Pass a pixel point through unchanged.
    pub fn from_pixel(p: Point2<f32>) -> Self {
        Self::new(p.x as f64, p.y as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_bounds_circle() {
        let rect = Rectangle::from_circle(&Circle::new(50.0, 40.0, 10.0));
        assert_eq!(rect, Rectangle::new(40.0, 30.0, 20.0, 20.0));
        assert_eq!(rect.center(), Point2::new(50.0, 40.0));
    }

    #[test]
    fn circle_serializes_flat() {
        let json = serde_json::to_string(&Circle::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(json, r#"{"x":1.0,"y":2.0,"radius":3.0}"#);
    }
}
