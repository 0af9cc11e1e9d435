//! Debug rendering for parameter tuning. Not used by the tracking loop.

use circle_track_detect::{edge_map, preprocess, Circle, DetectionParams};
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut};
use std::str::FromStr;

const OUTLINE: Rgb<u8> = Rgb([255, 0, 0]);
const CENTER: Rgb<u8> = Rgb([0, 255, 0]);

/// Which stage of the detector to show.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisplayMode {
    #[default]
    Original,
    Blurred,
    Edges,
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "original" => Ok(Self::Original),
            "blurred" | "blur" => Ok(Self::Blurred),
            "edges" | "canny" => Ok(Self::Edges),
            other => Err(format!(
                "unknown display mode '{other}' (expected original, blurred or edges)"
            )),
        }
    }
}

fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
        let v = gray.get_pixel(x, y).0[0];
        Rgb([v, v, v])
    })
}

/// The frame as seen at `mode`, with `circles` drawn on top
/// (outline plus a small center dot).
pub fn render_debug_frame(
    frame: &RgbImage,
    mode: DisplayMode,
    params: &DetectionParams,
    circles: &[Circle],
) -> RgbImage {
    let mut out = match mode {
        DisplayMode::Original => frame.clone(),
        DisplayMode::Blurred => gray_to_rgb(&preprocess(frame, params)),
        DisplayMode::Edges => gray_to_rgb(&edge_map(&preprocess(frame, params), params)),
    };
    for c in circles {
        let center = (c.x.round() as i32, c.y.round() as i32);
        draw_hollow_circle_mut(&mut out, center, c.radius.round() as i32, OUTLINE);
        draw_filled_circle_mut(&mut out, center, 2, CENTER);
    }
    out
}
