//! JSON tracker configuration and calibration files.

use circle_track_core::{CalibrationError, CalibrationTransform};
use circle_track_detect::{ClusterParams, DetectionParams, ParamsError};
use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Params(#[from] ParamsError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error("frame size must be positive (got {width}x{height})")]
    FrameSize { width: u32, height: u32 },
    #[error("MinGroupSize must be at least 1")]
    MinGroupSize,
    #[error("GroupTolerance must lie in (0, 1) (got {0})")]
    GroupTolerance(f32),
}

/// Detection and clustering settings, read once at startup.
///
/// Keys are PascalCase (`ImageWidthPx`, `BlurSize`, `CannyThreshold`, ...).
/// Missing keys take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TrackerConfig {
    pub image_height_px: u32,
    pub image_width_px: u32,
    pub blur_size: u32,
    pub blur_sigma: f64,
    pub canny_threshold: f32,
    pub min_radius: u32,
    pub max_radius: u32,
    pub accumulator_threshold: f32,
    pub min_group_size: usize,
    pub group_tolerance: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from_params(640, 480, &DetectionParams::default(), &ClusterParams::default())
    }
}

impl TrackerConfig {
    pub fn from_params(
        width: u32,
        height: u32,
        detection: &DetectionParams,
        cluster: &ClusterParams,
    ) -> Self {
        Self {
            image_height_px: height,
            image_width_px: width,
            blur_size: detection.blur_kernel_size,
            blur_sigma: detection.blur_sigma,
            canny_threshold: detection.edge_threshold,
            min_radius: detection.min_radius,
            max_radius: detection.max_radius,
            accumulator_threshold: detection.accumulator_threshold,
            min_group_size: cluster.min_group_size,
            group_tolerance: cluster.tolerance,
        }
    }

    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// `(width, height)` of the frames this configuration expects.
    pub fn frame_size(&self) -> (u32, u32) {
        (self.image_width_px, self.image_height_px)
    }

    pub fn detection_params(&self) -> Result<DetectionParams, ConfigError> {
        let params = DetectionParams {
            blur_kernel_size: self.blur_size,
            blur_sigma: self.blur_sigma,
            min_radius: self.min_radius,
            max_radius: self.max_radius,
            edge_threshold: self.canny_threshold,
            accumulator_threshold: self.accumulator_threshold,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn cluster_params(&self) -> Result<ClusterParams, ConfigError> {
        if self.min_group_size == 0 {
            return Err(ConfigError::MinGroupSize);
        }
        let t = self.group_tolerance;
        if !(t > 0.0 && t < 1.0) {
            return Err(ConfigError::GroupTolerance(t));
        }
        Ok(ClusterParams {
            min_group_size: self.min_group_size,
            tolerance: t,
        })
    }

    /// Check every field; the tracker refuses to start on the first error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (width, height) = self.frame_size();
        if width == 0 || height == 0 {
            return Err(ConfigError::FrameSize { width, height });
        }
        self.detection_params()?;
        self.cluster_params()?;
        Ok(())
    }
}

/// On-disk calibration: the pixel→plane homography plus optional
/// diagnostics left by the calibration tool.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationFile {
    #[serde(rename = "H")]
    pub homography: [[f64; 3]; 3],
    #[serde(
        rename = "ReprojectionError",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub reprojection_error: Option<f64>,
    /// Camera intrinsics.
    #[serde(rename = "A", default, skip_serializing_if = "Option::is_none")]
    pub camera_matrix: Option<[[f64; 3]; 3]>,
    /// Distortion coefficients.
    #[serde(rename = "K", default, skip_serializing_if = "Option::is_none")]
    pub distortion: Option<Vec<f64>>,
    #[serde(rename = "R", default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<[[f64; 3]; 3]>,
    #[serde(rename = "T", default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<[f64; 3]>,
}

impl CalibrationFile {
    pub fn from_transform(transform: &CalibrationTransform) -> Self {
        Self {
            homography: transform.to_array(),
            reprojection_error: None,
            camera_matrix: None,
            distortion: None,
            rotation: None,
            translation: None,
        }
    }

    /// Record a camera pose; `H` becomes the inverse plane-to-pixel map.
    pub fn from_camera_pose(
        camera: [[f64; 3]; 3],
        rotation: [[f64; 3]; 3],
        translation: [f64; 3],
    ) -> Result<Self, CalibrationError> {
        let transform = CalibrationTransform::from_camera_pose(
            &matrix_from_rows(&camera),
            &matrix_from_rows(&rotation),
            &Vector3::from(translation),
        )?;
        Ok(Self {
            camera_matrix: Some(camera),
            rotation: Some(rotation),
            translation: Some(translation),
            ..Self::from_transform(&transform)
        })
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// The stored homography, without any frame check.
    pub fn transform(&self) -> Result<CalibrationTransform, CalibrationError> {
        CalibrationTransform::from_array(self.homography)
    }
}

fn matrix_from_rows(rows: &[[f64; 3]; 3]) -> Matrix3<f64> {
    Matrix3::from_fn(|r, c| rows[r][c])
}

/// Load a calibration file and check it is usable on a `width × height` frame.
pub fn load_calibration(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
) -> Result<CalibrationTransform, ConfigError> {
    let file = CalibrationFile::load_json(path)?;
    let transform = file.transform()?;
    transform.validate_for_frame(width, height)?;
    if let Some(err) = file.reprojection_error {
        log::info!("calibration loaded (reprojection error {err:.4})");
    }
    Ok(transform)
}
