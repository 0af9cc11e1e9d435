use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::filter::separable_filter_equal;

pub fn to_grayscale(frame: &RgbImage) -> GrayImage {
    image::imageops::grayscale(frame)
}

/// Normalized 1-D Gaussian weights for an odd `ksize`.
///
/// A non-positive `sigma` is derived from the kernel size as
/// `0.3 * ((ksize - 1) / 2 - 1) + 0.8`.
pub fn gaussian_kernel(ksize: u32, sigma: f64) -> Vec<f32> {
    let ksize = ksize | 1;
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let half = (ksize / 2) as i32;
    let denom = 2.0 * sigma * sigma;

    let raw: Vec<f64> = (-half..=half)
        .map(|i| (-((i * i) as f64) / denom).exp())
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|w| (w / sum) as f32).collect()
}

// Mirror without repeating the edge pixel: -1 -> 1, n -> n - 2.
#[inline]
fn reflect_101(i: i32, n: i32) -> u32 {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as u32
}

/// Float copy of `gray` with a `pad` pixel reflect-101 border on every side.
///
/// `imageproc` filters pad by replicating the edge pixel; filtering the
/// padded copy and cropping gives reflect-101 borders instead.
fn pad_reflect_101(gray: &GrayImage, pad: u32) -> ImageBuffer<Luma<f32>, Vec<f32>> {
    let (w, h) = gray.dimensions();
    let p = pad as i32;
    ImageBuffer::from_fn(w + 2 * pad, h + 2 * pad, |x, y| {
        let sx = reflect_101(x as i32 - p, w as i32);
        let sy = reflect_101(y as i32 - p, h as i32);
        Luma([gray.get_pixel(sx, sy).0[0] as f32])
    })
}

/// Separable Gaussian blur with an explicit kernel size.
///
/// Convolution runs in `f32` through `imageproc::filter::separable_filter_equal`
/// and is rounded back to `u8` once at the end.
pub fn gaussian_blur(gray: &GrayImage, ksize: u32, sigma: f64) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }
    let kernel = gaussian_kernel(ksize, sigma);
    if kernel.len() == 1 {
        return gray.clone();
    }
    let pad = (kernel.len() / 2) as u32;
    let smoothed = separable_filter_equal(&pad_reflect_101(gray, pad), &kernel);

    GrayImage::from_fn(w, h, |x, y| {
        let v = smoothed.get_pixel(x + pad, y + pad).0[0];
        Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let k = gaussian_kernel(9, 2.0);
        assert_eq!(k.len(), 9);
        assert_relative_eq!(k.iter().sum::<f32>(), 1.0, epsilon = 1e-6);
        for i in 0..4 {
            assert_relative_eq!(k[i], k[8 - i], epsilon = 1e-7);
        }
        assert!(k[4] > k[3]);
    }

    #[test]
    fn even_kernel_size_rounds_up() {
        assert_eq!(gaussian_kernel(4, 1.0).len(), 5);
        assert_eq!(gaussian_kernel(0, 1.0).len(), 1);
    }

    #[test]
    fn reflect_mirrors_without_edge_repeat() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(2, 5), 2);
        assert_eq!(reflect_101(-3, 1), 0);
    }

    #[test]
    fn blur_keeps_flat_images_flat() {
        let img = GrayImage::from_pixel(17, 11, image::Luma([93]));
        let out = gaussian_blur(&img, 7, 1.5);
        assert!(out.pixels().all(|p| p.0[0] == 93));
    }

    #[test]
    fn padding_mirrors_the_border() {
        let img = GrayImage::from_fn(4, 3, |x, y| Luma([(10 * y + x) as u8]));
        let padded = pad_reflect_101(&img, 2);
        assert_eq!(padded.dimensions(), (8, 7));
        // (0, 0) of the padded image maps to source (2, 2).
        assert_eq!(padded.get_pixel(0, 0).0[0], 22.0);
        assert_eq!(padded.get_pixel(2, 2).0[0], 0.0);
        assert_eq!(padded.get_pixel(7, 3).0[0], 11.0);
    }

    #[test]
    fn blur_matches_a_direct_convolution() {
        let img = GrayImage::from_fn(23, 17, |x, y| Luma([((x * 37 + y * 91) % 256) as u8]));
        let kernel = gaussian_kernel(5, 1.2);
        let out = gaussian_blur(&img, 5, 1.2);

        let at = |x: i32, y: i32| {
            let sx = reflect_101(x, 23);
            let sy = reflect_101(y, 17);
            img.get_pixel(sx, sy).0[0] as f64
        };
        for (x, y) in [(0, 0), (11, 8), (22, 16), (1, 15)] {
            let mut acc = 0.0;
            for (j, ky) in kernel.iter().enumerate() {
                for (i, kx) in kernel.iter().enumerate() {
                    acc += (*kx as f64) * (*ky as f64) * at(x + i as i32 - 2, y + j as i32 - 2);
                }
            }
            let got = out.get_pixel(x as u32, y as u32).0[0] as f64;
            assert!((got - acc).abs() <= 1.0, "({x}, {y}): {got} vs {acc}");
        }
    }

    #[test]
    fn blur_spreads_an_impulse() {
        let mut img = GrayImage::new(9, 9);
        img.put_pixel(4, 4, image::Luma([255]));
        let out = gaussian_blur(&img, 5, 1.0);
        let center = out.get_pixel(4, 4).0[0];
        let side = out.get_pixel(5, 4).0[0];
        assert!(center < 255 && center > side && side > 0);
    }
}
