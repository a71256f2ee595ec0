use image::RgbImage;

use crate::frame::Mask;

/// 8-bit HSV with hue in `[0, 180)`, saturation and value in `[0, 255]`.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [f32; 3] {
    let [r, g, b] = rgb.map(|c| c as f32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = v - min;

    let s = if v > 0.0 { delta / v * 255.0 } else { 0.0 };
    let h = if delta <= 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / delta
    } else if v == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    let h = if h < 0.0 { h + 360.0 } else { h };
    [h * 0.5, s, v]
}

/// Joint H×S×V histogram of the masked pixels.
pub fn hsv_histogram(img: &RgbImage, mask: &Mask, bins: [usize; 3]) -> Vec<f64> {
    let [hb, sb, vb] = bins.map(|b| b.max(1));
    let mut hist = vec![0.0f64; hb * sb * vb];
    for (x, y, px) in img.enumerate_pixels() {
        if !mask.get(y as usize, x as usize) {
            continue;
        }
        let [h, s, v] = rgb_to_hsv(px.0);
        let hi = ((h / 180.0 * hb as f32) as usize).min(hb - 1);
        let si = ((s / 256.0 * sb as f32) as usize).min(sb - 1);
        let vi = ((v / 256.0 * vb as f32) as usize).min(vb - 1);
        hist[(hi * sb + si) * vb + vi] += 1.0;
    }
    hist
}

/// Correlation coefficient between two histograms; 1 when both are flat.
pub fn histogram_correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n == 0 {
        return 1.0;
    }
    let mean_a = a[..n].iter().sum::<f64>() / n as f64;
    let mean_b = b[..n].iter().sum::<f64>() / n as f64;
    let (mut num, mut den_a, mut den_b) = (0.0, 0.0, 0.0);
    for (x, y) in a[..n].iter().zip(&b[..n]) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        num += dx * dy;
        den_a += dx * dx;
        den_b += dy * dy;
    }
    let den = (den_a * den_b).sqrt();
    if den > f64::EPSILON {
        num / den
    } else {
        1.0
    }
}

/// HSV histogram correlation of the masked region, mapped to `[0, 1]`.
///
/// An empty mask scores 0.
pub fn histogram_similarity(a: &RgbImage, b: &RgbImage, mask: &Mask, bins: [usize; 3]) -> f64 {
    if mask.is_empty() {
        return 0.0;
    }
    let ha = hsv_histogram(a, mask, bins);
    let hb = hsv_histogram(b, mask, bins);
    ((histogram_correlation(&ha, &hb) + 1.0) * 0.5).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0.0, 255.0, 255.0]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60.0, 255.0, 255.0]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120.0, 255.0, 255.0]);
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_identical_histograms_correlate() {
        let h = vec![1.0, 4.0, 0.0, 2.0];
        assert!((histogram_correlation(&h, &h) - 1.0).abs() < 1e-12);
    }
}
