use crate::WorldPosition;
use nalgebra::{DMatrix, Matrix3, Point2, Vector3};

/// Smallest homogeneous scale accepted by the projective divide.
pub const MIN_PROJECTIVE_SCALE: f64 = 1e-12;

/// The projective divide hit (or came too close to) the line at infinity.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq)]
pub enum ProjectionError {
    #[error("degenerate projection of pixel ({x}, {y}): homogeneous scale {w:e}")]
    Degenerate { x: f64, y: f64, w: f64 },
}

/// Calibration matrices that cannot be used to map pixels onto the plane.
#[derive(thiserror::Error, Clone, Debug, PartialEq)]
pub enum CalibrationError {
    #[error("calibration matrix has non-finite entries")]
    NonFinite,
    #[error("calibration matrix is singular")]
    Singular,
    #[error(
        "projective scale vanishes inside the {width}x{height} frame \
         (corner scales range {min:e}..{max:e})"
    )]
    DegenerateInFrame {
        width: u32,
        height: u32,
        min: f64,
        max: f64,
    },
    #[error("need at least 4 matching point pairs (got {pixel} pixel and {world} world points)")]
    InsufficientCorrespondences { pixel: usize, world: usize },
    #[error("homography estimation did not converge")]
    EstimationFailed,
}

/// Pixel-to-world projective transform.
///
/// Wraps an immutable 3×3 matrix `H` and maps a pixel `(px, py)` to
/// `(u.x / u.z, u.y / u.z)` where `u = H · (px, py, 1)ᵗ`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationTransform {
    h: Matrix3<f64>,
}

impl CalibrationTransform {
    /// Wrap `h`, rejecting matrices with non-finite entries or no inverse.
    pub fn new(h: Matrix3<f64>) -> Result<Self, CalibrationError> {
        if h.iter().any(|v| !v.is_finite()) {
            return Err(CalibrationError::NonFinite);
        }
        let scale = h.norm();
        if scale == 0.0 || h.determinant().abs() <= f64::EPSILON * scale.powi(3) {
            return Err(CalibrationError::Singular);
        }
        Ok(Self { h })
    }

    pub fn identity() -> Self {
        Self {
            h: Matrix3::identity(),
        }
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Result<Self, CalibrationError> {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    #[inline]
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.h
    }

    /// Build the pixel→plane map from a calibrated camera pose.
    ///
    /// For the world plane `z = 0` a pixel is `p ~ A · [r1 r2 t] · (X, Y, 1)ᵗ`,
    /// so the returned transform is `(A · [r1 r2 t])⁻¹`, scaled to `h33 = 1`
    /// when possible.
    pub fn from_camera_pose(
        camera: &Matrix3<f64>,
        rotation: &Matrix3<f64>,
        translation: &Vector3<f64>,
    ) -> Result<Self, CalibrationError> {
        let mut rt = *rotation;
        rt.set_column(2, translation);
        let plane_to_pixel = camera * rt;
        let h = plane_to_pixel
            .try_inverse()
            .ok_or(CalibrationError::Singular)?;
        Self::new(normalize_homography(h).unwrap_or(h))
    }

    /// Estimate H such that `p_world ~ H * p_pixel` from point pairs (normalized DLT).
    pub fn from_correspondences(
        pixel: &[Point2<f64>],
        world: &[Point2<f64>],
    ) -> Result<Self, CalibrationError> {
        if pixel.len() != world.len() || pixel.len() < 4 {
            return Err(CalibrationError::InsufficientCorrespondences {
                pixel: pixel.len(),
                world: world.len(),
            });
        }

        let (src, t_src) = normalize_points(pixel);
        let (dst, t_dst) = normalize_points(world);

        let n = src.len();
        // Pad to at least 9 rows so the thin SVD still yields a full V.
        let mut a = DMatrix::<f64>::zeros((2 * n).max(9), 9);
        for k in 0..n {
            let (x, y) = (src[k].x, src[k].y);
            let (u, v) = (dst[k].x, dst[k].y);

            // [ -x -y -1   0  0  0   u*x u*y u ]
            a[(2 * k, 0)] = -x;
            a[(2 * k, 1)] = -y;
            a[(2 * k, 2)] = -1.0;
            a[(2 * k, 6)] = u * x;
            a[(2 * k, 7)] = u * y;
            a[(2 * k, 8)] = u;

            // [ 0  0  0  -x -y -1   v*x v*y v ]
            a[(2 * k + 1, 3)] = -x;
            a[(2 * k + 1, 4)] = -y;
            a[(2 * k + 1, 5)] = -1.0;
            a[(2 * k + 1, 6)] = v * x;
            a[(2 * k + 1, 7)] = v * y;
            a[(2 * k + 1, 8)] = v;
        }

        // Null vector of A: right singular vector of the smallest singular value.
        let svd = a.svd(false, true);
        let vt = svd.v_t.ok_or(CalibrationError::EstimationFailed)?;
        let (smallest, _) = svd
            .singular_values
            .iter()
            .enumerate()
            .fold((0usize, f64::INFINITY), |best, (i, &s)| {
                if s < best.1 {
                    (i, s)
                } else {
                    best
                }
            });
        let h = vt.row(smallest);
        let hn = Matrix3::from_row_slice(&[h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]]);

        let t_dst_inv = t_dst
            .try_inverse()
            .ok_or(CalibrationError::EstimationFailed)?;
        let h = normalize_homography(t_dst_inv * hn * t_src)
            .ok_or(CalibrationError::EstimationFailed)?;
        Self::new(h)
    }

    /// Homogeneous scale `w` of the projected pixel.
    #[inline]
    pub fn projective_scale(&self, px: f64, py: f64) -> f64 {
        self.h[(2, 0)] * px + self.h[(2, 1)] * py + self.h[(2, 2)]
    }

    /// Reject calibrations whose scale vanishes or flips sign over the frame.
    ///
    /// `w` is affine in the pixel coordinates, so it keeps one sign on the
    /// whole `[0, width] × [0, height]` rectangle iff it does at the corners.
    pub fn validate_for_frame(&self, width: u32, height: u32) -> Result<(), CalibrationError> {
        let (w, h) = (width as f64, height as f64);
        let scales = [
            self.projective_scale(0.0, 0.0),
            self.projective_scale(w, 0.0),
            self.projective_scale(0.0, h),
            self.projective_scale(w, h),
        ];
        let min = scales.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scales.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let same_sign = min > 0.0 || max < 0.0;
        if !same_sign || min.abs().min(max.abs()) < MIN_PROJECTIVE_SCALE {
            return Err(CalibrationError::DegenerateInFrame {
                width,
                height,
                min,
                max,
            });
        }
        Ok(())
    }

    /// Map a pixel to world coordinates.
    ///
    /// Fails instead of returning infinite or NaN coordinates when the
    /// homogeneous scale is below [`MIN_PROJECTIVE_SCALE`].
    #[inline]
    pub fn to_world(&self, px: f64, py: f64) -> Result<WorldPosition, ProjectionError> {
        let u = self.h * Vector3::new(px, py, 1.0);
        let w = u[2];
        let degenerate = ProjectionError::Degenerate { x: px, y: py, w };
        if w.abs() < MIN_PROJECTIVE_SCALE {
            return Err(degenerate);
        }
        let (x, y) = (u[0] / w, u[1] / w);
        if !x.is_finite() || !y.is_finite() {
            return Err(degenerate);
        }
        Ok(WorldPosition::new(x, y))
    }

    pub fn apply(&self, p: Point2<f64>) -> Result<Point2<f64>, ProjectionError> {
        self.to_world(p.x, p.y).map(|w| Point2::new(w.x, w.y))
    }
}

impl Default for CalibrationTransform {
    fn default() -> Self {
        Self::identity()
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

// Translate to the centroid, scale so the mean distance is sqrt(2).
fn normalize_points(pts: &[Point2<f64>]) -> (Vec<Point2<f64>>, Matrix3<f64>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let t = hartley_normalization(cx, cy, mean_dist);
    let out = pts
        .iter()
        .map(|p| {
            let v = t * Vector3::new(p.x, p.y, 1.0);
            Point2::new(v[0], v[1])
        })
        .collect();
    (out, t)
}

fn normalize_homography(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < MIN_PROJECTIVE_SCALE {
        return None;
    }
    Some(h / s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_world(calib: &CalibrationTransform, px: f64, py: f64, x: f64, y: f64) {
        let w = calib.to_world(px, py).expect("projectable");
        assert_relative_eq!(w.x, x, epsilon = 1e-9);
        assert_relative_eq!(w.y, y, epsilon = 1e-9);
    }

    #[test]
    fn identity_returns_input() {
        let calib = CalibrationTransform::identity();
        for (px, py) in [(0.0, 0.0), (12.5, 7.25), (1599.0, 1199.0)] {
            assert_world(&calib, px, py, px, py);
        }
    }

    #[test]
    fn affine_matrix_matches_hand_computation() {
        let calib =
            CalibrationTransform::from_array([[2.0, 0.0, 1.0], [0.0, 3.0, -2.0], [0.0, 0.0, 1.0]])
                .unwrap();
        assert_world(&calib, 4.0, 5.0, 9.0, 13.0);
        assert_world(&calib, 0.0, 0.0, 1.0, -2.0);
    }

    #[test]
    fn projective_divide_matches_hand_computation() {
        // w = 0.01 * px + 1
        let calib =
            CalibrationTransform::from_array([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.01, 0.0, 1.0]])
                .unwrap();
        assert_world(&calib, 100.0, 50.0, 50.0, 25.0);
        assert_world(&calib, 300.0, 40.0, 75.0, 10.0);
    }

    #[test]
    fn singular_point_is_reported() {
        // w = px - 100
        let calib =
            CalibrationTransform::from_array([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, -100.0]])
                .unwrap();
        let err = calib.to_world(100.0, 3.0).unwrap_err();
        assert!(matches!(err, ProjectionError::Degenerate { w, .. } if w == 0.0));
        assert!(calib.to_world(101.0, 3.0).is_ok());
    }

    #[test]
    fn frame_check_rejects_scale_sign_change() {
        let calib =
            CalibrationTransform::from_array([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, -100.0]])
                .unwrap();
        assert!(matches!(
            calib.validate_for_frame(200, 100),
            Err(CalibrationError::DegenerateInFrame { .. })
        ));
        // Shifted right of the singular column: w in [101, 201].
        let shifted = CalibrationTransform::new(
            calib.matrix() * Matrix3::new(1.0, 0.0, 201.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0),
        )
        .unwrap();
        assert!(shifted.validate_for_frame(100, 100).is_ok());
        assert!(CalibrationTransform::identity()
            .validate_for_frame(1600, 1200)
            .is_ok());
    }

    #[test]
    fn rejects_singular_and_non_finite() {
        assert_eq!(
            CalibrationTransform::new(Matrix3::zeros()),
            Err(CalibrationError::Singular)
        );
        let rank_two = Matrix3::new(1.0, 2.0, 3.0, 2.0, 4.0, 6.0, 0.0, 0.0, 1.0);
        assert_eq!(
            CalibrationTransform::new(rank_two),
            Err(CalibrationError::Singular)
        );
        let mut nan = Matrix3::identity();
        nan[(0, 1)] = f64::NAN;
        assert_eq!(
            CalibrationTransform::new(nan),
            Err(CalibrationError::NonFinite)
        );
    }

    #[test]
    fn camera_pose_inverts_plane_projection() {
        let camera = Matrix3::new(800.0, 0.0, 320.0, 0.0, 780.0, 240.0, 0.0, 0.0, 1.0);
        let (c, s) = (0.3_f64.cos(), 0.3_f64.sin());
        let rotation = Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c);
        let translation = Vector3::new(-50.0, -20.0, 600.0);
        let calib = CalibrationTransform::from_camera_pose(&camera, &rotation, &translation)
            .expect("valid pose");

        let mut rt = rotation;
        rt.set_column(2, &translation);
        let plane_to_pixel = camera * rt;
        for (x, y) in [(0.0, 0.0), (25.0, 40.0), (-30.0, 90.0)] {
            let p = plane_to_pixel * Vector3::new(x, y, 1.0);
            let w = calib.to_world(p[0] / p[2], p[1] / p[2]).unwrap();
            assert_relative_eq!(w.x, x, epsilon = 1e-6);
            assert_relative_eq!(w.y, y, epsilon = 1e-6);
        }
        assert_relative_eq!(calib.matrix()[(2, 2)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn correspondences_recover_homography() {
        let truth = CalibrationTransform::from_array([
            [0.5, 0.02, -40.0],
            [-0.01, 0.6, -25.0],
            [0.0002, 0.0001, 1.0],
        ])
        .unwrap();

        let pixel: Vec<Point2<f64>> = (0..4)
            .flat_map(|j| (0..5).map(move |i| Point2::new(i as f64 * 150.0, j as f64 * 120.0)))
            .collect();
        let world: Vec<Point2<f64>> = pixel.iter().map(|&p| truth.apply(p).unwrap()).collect();

        let estimated = CalibrationTransform::from_correspondences(&pixel, &world).unwrap();
        for p in [Point2::new(10.0, 20.0), Point2::new(500.0, 333.0)] {
            let a = estimated.apply(p).unwrap();
            let b = truth.apply(p).unwrap();
            assert_relative_eq!(a.x, b.x, epsilon = 1e-6);
            assert_relative_eq!(a.y, b.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn correspondences_need_four_pairs() {
        let pts = [Point2::new(0.0, 0.0); 3];
        assert_eq!(
            CalibrationTransform::from_correspondences(&pts, &pts),
            Err(CalibrationError::InsufficientCorrespondences { pixel: 3, world: 3 })
        );
    }
}
