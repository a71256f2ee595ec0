use image::RgbImage;
use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::coords::Point;
use crate::frame::Mask;

use super::composer::WarpTransform;

/// Inside-test slack so that exact edge coordinates count as covered.
const EDGE_EPS: f64 = 1e-6;

/// Result of warping a raster into a destination frame.
#[derive(Clone, Debug)]
pub struct WarpedImage {
    pub image: RgbImage,
    /// Destination pixels whose sampling point fell inside the source.
    pub coverage: Mask,
}

/// Warp `src` into an `out_w × out_h` frame with bilinear sampling.
///
/// Pixels mapping outside the source stay zero: the border is constant, never
/// wrapped or mirrored.
pub fn warp_rgb(src: &RgbImage, transform: &WarpTransform, out_w: u32, out_h: u32) -> WarpedImage {
    let (w, h) = (out_w as usize, out_h as usize);
    let inverse = match transform.as_homography().inverse() {
        Some(inv) => inv,
        None => {
            return WarpedImage {
                image: RgbImage::new(out_w, out_h),
                coverage: Mask::new(Array2::from_elem((h, w), false)),
            }
        }
    };

    let render_row = |row: usize| -> (Vec<u8>, Vec<bool>) {
        let mut pixels = vec![0u8; w * 3];
        let mut covered = vec![false; w];
        for col in 0..w {
            let Some(p) = inverse.apply(Point::new(col as f64, row as f64)) else {
                continue;
            };
            if let Some((rgb, inside)) = bilinear_sample_rgb(src, p.y, p.x) {
                pixels[col * 3..col * 3 + 3].copy_from_slice(&rgb);
                covered[col] = inside;
            }
        }
        (pixels, covered)
    };

    let rows: Vec<(Vec<u8>, Vec<bool>)> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(render_row).collect()
    } else {
        (0..h).map(render_row).collect()
    };

    let mut raw = Vec::with_capacity(h * w * 3);
    let mut coverage = Vec::with_capacity(h * w);
    for (pixels, covered) in rows {
        raw.extend_from_slice(&pixels);
        coverage.extend_from_slice(&covered);
    }

    WarpedImage {
        image: RgbImage::from_raw(out_w, out_h, raw).expect("buffer size matches dimensions"),
        coverage: Mask::new(
            Array2::from_shape_vec((h, w), coverage).expect("buffer size matches dimensions"),
        ),
    }
}

/// Sample all three channels at `(y, x)`.
///
/// Returns `None` when no neighbour lies inside the source; otherwise the
/// blended value (out-of-bounds neighbours count as zero) and whether the
/// point was fully inside.
pub fn bilinear_sample_rgb(src: &RgbImage, y: f64, x: f64) -> Option<([u8; 3], bool)> {
    let (w, h) = (src.width() as i64, src.height() as i64);
    if x <= -1.0 || y <= -1.0 || x >= w as f64 || y >= h as f64 {
        return None;
    }
    let inside = x >= -EDGE_EPS
        && y >= -EDGE_EPS
        && x <= (w - 1) as f64 + EDGE_EPS
        && y <= (h - 1) as f64 + EDGE_EPS;

    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let x1 = x0 + 1;
    let y1 = y0 + 1;

    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let raw = src.as_raw();
    let sample = |r: i64, c: i64, ch: usize| -> f64 {
        if r >= 0 && r < h && c >= 0 && c < w {
            raw[(r as usize * w as usize + c as usize) * 3 + ch] as f64
        } else {
            0.0
        }
    };

    let mut out = [0u8; 3];
    for (ch, v) in out.iter_mut().enumerate() {
        let value = sample(y0, x0, ch) * (1.0 - fx) * (1.0 - fy)
            + sample(y0, x1, ch) * fx * (1.0 - fy)
            + sample(y1, x0, ch) * (1.0 - fx) * fy
            + sample(y1, x1, ch) * fx * fy;
        *v = value.round().clamp(0.0, 255.0) as u8;
    }
    Some((out, inside))
}
