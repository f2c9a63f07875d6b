//! Image primitives for artifact analysis.
//!
//! Filtering and edge detection come from `imageproc`, which clamps
//! coordinates at the image border. Only the luma conversion and the plain
//! statistics live here.

use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::edges;
use imageproc::filter;
use imageproc::map::map_colors;

/// Binomial approximation of a 5-tap Gaussian, `[1 4 6 4 1] / 16`.
const BINOMIAL_5: [f32; 5] = [0.0625, 0.25, 0.375, 0.25, 0.0625];

/// Luma of an RGB image using BT.601 weights in 14-bit fixed point, rounded to
/// whole intensity levels.
pub fn grayscale(image: &RgbImage) -> GrayImage {
    map_colors(image, |p| {
        let (r, g, b) = (u32::from(p[0]), u32::from(p[1]), u32::from(p[2]));
        Luma([((r * 4899 + g * 9617 + b * 1868 + (1 << 13)) >> 14) as u8])
    })
}

/// Four-neighbour Laplacian response of every pixel.
pub fn laplacian(gray: &GrayImage) -> Vec<f64> {
    filter::laplacian_filter(gray)
        .pixels()
        .map(|p| f64::from(p[0]))
        .collect()
}

/// High-frequency residual: the image minus its 5x5 binomial blur.
pub fn noise_residual(gray: &GrayImage) -> Vec<f64> {
    let plane: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_fn(gray.width(), gray.height(), |x, y| {
            Luma([f32::from(gray.get_pixel(x, y)[0])])
        });
    let blurred = filter::separable_filter_equal(&plane, &BINOMIAL_5);
    plane
        .pixels()
        .zip(blurred.pixels())
        .map(|(p, b)| f64::from(p[0]) - f64::from(b[0]))
        .collect()
}

/// Canny edge map, one flag per pixel in row-major order.
pub fn canny(gray: &GrayImage, low: f32, high: f32) -> Vec<bool> {
    if gray.width() == 0 || gray.height() == 0 {
        return Vec::new();
    }
    edges::canny(gray, low, high)
        .pixels()
        .map(|p| p[0] > 0)
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population variance.
pub fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mu = mean(values);
    values.iter().map(|v| (v - mu) * (v - mu)).sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn grayscale_uses_bt601_weights() {
        let image = RgbImage::from_fn(3, 1, |x, _| match x {
            0 => Rgb([255, 0, 0]),
            1 => Rgb([0, 255, 0]),
            _ => Rgb([255, 255, 255]),
        });
        let gray = grayscale(&image);
        assert_eq!(gray.into_raw(), vec![76, 150, 255]);
    }

    #[test]
    fn laplacian_of_constant_is_zero() {
        let gray = GrayImage::from_pixel(6, 4, Luma([42]));
        assert!(laplacian(&gray).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn laplacian_responds_to_a_spike() {
        let gray = GrayImage::from_fn(5, 5, |x, y| Luma([if x == 2 && y == 2 { 10 } else { 0 }]));
        let lap = laplacian(&gray);
        assert_eq!(lap[2 * 5 + 2], -40.0);
        assert_eq!(lap[2 * 5 + 1], 10.0);
    }

    #[test]
    fn residual_of_constant_is_zero() {
        let gray = GrayImage::from_pixel(7, 7, Luma([9]));
        assert!(noise_residual(&gray).iter().all(|&v| v.abs() < 1e-9));
    }

    #[test]
    fn residual_keeps_a_spike() {
        let gray = GrayImage::from_fn(9, 9, |x, y| Luma([if x == 4 && y == 4 { 255 } else { 0 }]));
        let residual = noise_residual(&gray);
        let expected = 255.0 - 255.0 * 0.375 * 0.375;
        assert!((residual[4 * 9 + 4] - expected).abs() < 1e-3);
        assert!(residual[0].abs() < 1e-9);
    }

    #[test]
    fn canny_finds_vertical_step_edge() {
        // Single mid-level column so the gradient peak is unique.
        let gray = GrayImage::from_fn(20, 10, |x, _| {
            Luma([match x {
                0..=9 => 0,
                10 => 100,
                _ => 200,
            }])
        });
        let edges = canny(&gray, 50.0, 150.0);
        assert_eq!(edges.len(), 200);
        for y in 1..9 {
            let row: Vec<bool> = (0..20).map(|x| edges[y * 20 + x]).collect();
            assert!(row[10], "row {} has no edge at the step", y);
            assert!(!row[0] && !row[5] && !row[15] && !row[19]);
        }
    }

    #[test]
    fn canny_on_flat_image_has_no_edges() {
        let gray = GrayImage::from_pixel(8, 8, Luma([100]));
        assert!(canny(&gray, 50.0, 150.0).iter().all(|e| !e));
        assert!(canny(&GrayImage::new(0, 0), 50.0, 150.0).is_empty());
    }

    #[test]
    fn variance_is_population_variance() {
        assert_eq!(variance(&[0.1, 0.9]), 0.16000000000000003);
        assert_eq!(variance(&[]), 0.0);
        assert_eq!(mean(&[1.0, 2.0, 3.0]), 2.0);
    }
}
