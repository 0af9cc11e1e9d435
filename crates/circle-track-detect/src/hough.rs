//! Circular Hough transform, gradient variant.
//!
//! Edge pixels vote along their gradient direction (both ways) for every
//! radius in range, so all votes of a circle pile up at its center. Centers
//! are then confirmed one by one, strongest first, by looking for a radius
//! that many edge pixels agree on.

use circle_track_core::Circle;
use image::{GrayImage, ImageBuffer, Luma};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::DetectionParams;

/// Width of a radius bin when looking for the best supported radius.
const RADIUS_BIN: f32 = 1.0;

struct CenterCandidate {
    x: u32,
    y: u32,
    votes: u32,
}

/// Detect circles on a blurred grayscale image.
///
/// `edges` is the binary edge map of `gray` (non-zero = edge). Gradients
/// are taken from `gray` with a 3×3 Sobel. Circles come out strongest
/// first, but callers must not depend on the order.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(width = gray.width(), height = gray.height()))
)]
pub fn hough_circles(gray: &GrayImage, edges: &GrayImage, params: &DetectionParams) -> Vec<Circle> {
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 || edges.dimensions() != (w, h) || params.max_radius == 0 {
        return Vec::new();
    }

    let gx = imageproc::gradients::horizontal_sobel(gray);
    let gy = imageproc::gradients::vertical_sobel(gray);
    let (accum, edge_points) = accumulate(edges, &gx, &gy, params);
    if edge_points.is_empty() {
        return Vec::new();
    }

    let centers = find_centers(&accum, w as usize, h as usize, params.accumulator_threshold);
    log::trace!(
        "hough: {} edge points, {} center candidates",
        edge_points.len(),
        centers.len()
    );

    let min_dist_sq = params.min_center_distance().powi(2);
    let min_r_sq = (params.min_radius as f32).powi(2);
    let max_r_sq = (params.max_radius as f32).powi(2);

    let mut circles: Vec<Circle> = Vec::new();
    let mut dists = Vec::with_capacity(edge_points.len());
    for c in centers {
        let (cx, cy) = (c.x as f32, c.y as f32);
        let too_close = circles.iter().any(|other| {
            let dx = other.x - cx;
            let dy = other.y - cy;
            dx * dx + dy * dy < min_dist_sq
        });
        if too_close {
            continue;
        }

        dists.clear();
        dists.extend(edge_points.iter().filter_map(|&(px, py)| {
            let dx = px as f32 - cx;
            let dy = py as f32 - cy;
            let d2 = dx * dx + dy * dy;
            (min_r_sq..=max_r_sq).contains(&d2).then(|| d2.sqrt())
        }));
        if dists.is_empty() {
            continue;
        }
        dists.sort_by(f32::total_cmp);

        if let Some((radius, support)) = best_radius(&dists) {
            if support as f32 > params.accumulator_threshold {
                circles.push(Circle::new(cx, cy, radius));
            }
        }
    }
    circles
}

type GradientImage = ImageBuffer<Luma<i16>, Vec<i16>>;

// Returns the vote accumulator (row-major, same size as the image) and the
// list of edge pixels that cast votes.
fn accumulate(
    edges: &GrayImage,
    gx: &GradientImage,
    gy: &GradientImage,
    params: &DetectionParams,
) -> (Vec<u32>, Vec<(u32, u32)>) {
    let (w, h) = edges.dimensions();
    let stride = w as usize;
    let mut accum = vec![0u32; stride * h as usize];
    let mut points = Vec::new();
    let (wf, hf) = (w as f32, h as f32);
    let r_min = params.min_radius;
    let r_max = params.max_radius;

    for (x, y, px) in edges.enumerate_pixels() {
        if px.0[0] == 0 {
            continue;
        }
        let vx = gx.get_pixel(x, y).0[0] as f32;
        let vy = gy.get_pixel(x, y).0[0] as f32;
        let mag = (vx * vx + vy * vy).sqrt();
        if mag < f32::EPSILON {
            continue;
        }
        points.push((x, y));

        let (dx, dy) = (vx / mag, vy / mag);
        for sign in [1.0f32, -1.0] {
            for r in r_min..=r_max {
                let cx = (x as f32 + sign * dx * r as f32).round();
                let cy = (y as f32 + sign * dy * r as f32).round();
                if cx < 0.0 || cy < 0.0 || cx >= wf || cy >= hf {
                    break;
                }
                accum[cy as usize * stride + cx as usize] += 1;
            }
        }
    }
    (accum, points)
}

// Local maxima of the accumulator above `threshold`, strongest first.
// Plateaus are broken toward the top-left cell so a tie still yields a center.
fn find_centers(accum: &[u32], w: usize, h: usize, threshold: f32) -> Vec<CenterCandidate> {
    let mut centers = Vec::new();
    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let idx = y * w + x;
            let v = accum[idx];
            if (v as f32) <= threshold {
                continue;
            }
            if v > accum[idx - 1] && v >= accum[idx + 1] && v > accum[idx - w] && v >= accum[idx + w]
            {
                centers.push(CenterCandidate {
                    x: x as u32,
                    y: y as u32,
                    votes: v,
                });
            }
        }
    }
    // Stable: equal votes keep raster order.
    centers.sort_by(|a, b| b.votes.cmp(&a.votes));
    centers
}

/// Pick the radius bin with the highest support per unit radius.
///
/// `dists` must be sorted ascending. Bins are runs spanning at most
/// `RADIUS_BIN`; a bin's radius is its median distance. Ties keep the
/// smaller radius. Returns `(radius, support)`.
fn best_radius(dists: &[f32]) -> Option<(f32, usize)> {
    let mut best: Option<(f32, usize)> = None;
    let mut start = 0;
    for j in 1..=dists.len() {
        let closes_bin = j == dists.len() || dists[j] - dists[start] > RADIUS_BIN;
        if !closes_bin {
            continue;
        }
        let count = j - start;
        let radius = dists[(start + j - 1) / 2];
        best = match best {
            Some((r_best, c_best)) if (count as f32) * r_best <= (c_best as f32) * radius => {
                Some((r_best, c_best))
            }
            _ => Some((radius, count)),
        };
        start = j;
    }
    best
}
