use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    #[error("min_radius ({min}) must not exceed max_radius ({max})")]
    RadiusRange { min: u32, max: u32 },
    #[error("max_radius must be positive")]
    ZeroMaxRadius,
    #[error("{name} must be finite and non-negative (got {value})")]
    Negative { name: &'static str, value: f64 },
}

/// Parameters of the circle detector.
///
/// Passed explicitly on every detection; interactive tuning replaces the
/// struct and re-runs detection.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Requested Gaussian kernel size. Even values are bumped to the next odd one.
    pub blur_kernel_size: u32,
    /// Gaussian sigma in pixels. Non-positive derives it from the kernel size.
    pub blur_sigma: f64,
    /// Smallest circle radius to look for (pixels).
    pub min_radius: u32,
    /// Largest circle radius to look for (pixels).
    pub max_radius: u32,
    /// Upper Canny threshold; the lower one is `max(edge_threshold / 2, 1)`.
    pub edge_threshold: f32,
    /// Votes a center (and its radius) needs to be accepted.
    pub accumulator_threshold: f32,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            blur_kernel_size: 9,
            blur_sigma: 2.0,
            min_radius: 60,
            max_radius: 80,
            edge_threshold: 100.0,
            accumulator_threshold: 27.0,
        }
    }
}

impl DetectionParams {
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.max_radius == 0 {
            return Err(ParamsError::ZeroMaxRadius);
        }
        if self.min_radius > self.max_radius {
            return Err(ParamsError::RadiusRange {
                min: self.min_radius,
                max: self.max_radius,
            });
        }
        for (name, value) in [
            ("blur_sigma", self.blur_sigma),
            ("edge_threshold", self.edge_threshold as f64),
            ("accumulator_threshold", self.accumulator_threshold as f64),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ParamsError::Negative { name, value });
            }
        }
        Ok(())
    }

    /// Kernel size actually used: the smallest odd value `>=` the configured one.
    #[inline]
    pub fn effective_kernel_size(&self) -> u32 {
        self.blur_kernel_size | 1
    }

    #[inline]
    pub fn canny_low(&self) -> f32 {
        (self.edge_threshold / 2.0).max(1.0)
    }

    #[inline]
    pub fn canny_high(&self) -> f32 {
        self.edge_threshold.max(self.canny_low())
    }

    /// Minimum distance between two accepted centers.
    #[inline]
    pub fn min_center_distance(&self) -> f32 {
        (2 * self.min_radius).max(1) as f32
    }
}
