use image::RgbImage;
use ndarray::Zip;

use crate::consts::{EPSILON, MSE_FLOOR, PSNR_CEILING_DB};
use crate::frame::{Frame, Mask};

/// Pearson correlation of the masked luminance, mapped from `[-1, 1]` to `[0, 1]`.
///
/// Fewer than `min_samples` pixels score 0. When either series is constant
/// the coefficient is undefined: identical series score 1, anything else 0.5.
pub fn correlation(x: &Frame, y: &Frame, mask: &Mask, min_samples: usize) -> f64 {
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    Zip::from(&x.data)
        .and(&y.data)
        .and(&mask.data)
        .for_each(|&a, &b, &m| {
            if m {
                xs.push(a as f64);
                ys.push(b as f64);
            }
        });

    let n = xs.len();
    if n < min_samples.max(2) {
        return 0.0;
    }

    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;
    let (mut cov, mut var_x, mut var_y) = (0.0, 0.0, 0.0);
    for (a, b) in xs.iter().zip(&ys) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let den = (var_x * var_y).sqrt();
    if den <= EPSILON {
        let identical = xs.iter().zip(&ys).all(|(a, b)| (a - b).abs() <= EPSILON);
        return if identical { 1.0 } else { 0.5 };
    }
    let c = (cov / den).clamp(-1.0, 1.0);
    (c + 1.0) * 0.5
}

/// PSNR over all three 8-bit channels of the masked pixels, divided by the
/// 60 dB ceiling and clamped to `[0, 1]`.
///
/// Empty mask scores 0; a mean squared error at the floor scores 1.
pub fn psnr_normalized(a: &RgbImage, b: &RgbImage, mask: &Mask) -> f64 {
    let (w, h) = a.dimensions();
    let (ra, rb) = (a.as_raw(), b.as_raw());
    let mut sum = 0.0f64;
    let mut n = 0usize;
    for row in 0..h as usize {
        for col in 0..w as usize {
            if !mask.get(row, col) {
                continue;
            }
            let i = (row * w as usize + col) * 3;
            for ch in 0..3 {
                let d = ra[i + ch] as f64 - rb[i + ch] as f64;
                sum += d * d;
            }
            n += 3;
        }
    }
    if n == 0 {
        return 0.0;
    }

    let mse = sum / n as f64;
    if mse <= MSE_FLOOR {
        return 1.0;
    }
    let psnr = 20.0 * 255f64.log10() - 10.0 * mse.log10();
    (psnr / PSNR_CEILING_DB).clamp(0.0, 1.0)
}
