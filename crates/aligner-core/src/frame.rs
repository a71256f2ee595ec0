use image::RgbImage;
use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::{LUMINANCE_B, LUMINANCE_G, LUMINANCE_R, PARALLEL_PIXEL_THRESHOLD};

/// A single grayscale plane.
/// Pixel values are f32 in [0.0, 1.0].
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<f32>,
}

impl Frame {
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// BT.601 luminance of an RGB raster.
    pub fn from_rgb(img: &RgbImage) -> Self {
        let (w, h) = img.dimensions();
        let (w, h) = (w as usize, h as usize);
        let raw = img.as_raw();
        let luma = |i: usize| {
            let p = &raw[i * 3..i * 3 + 3];
            (LUMINANCE_R * p[0] as f32 + LUMINANCE_G * p[1] as f32 + LUMINANCE_B * p[2] as f32)
                / 255.0
        };

        let values: Vec<f32> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
            (0..h * w).into_par_iter().map(luma).collect()
        } else {
            (0..h * w).map(luma).collect()
        };
        let data = Array2::from_shape_vec((h, w), values).expect("buffer size matches dimensions");
        Self { data }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// 8-bit view of the plane, used by the keypoint detector.
    pub fn to_u8(&self) -> Array2<u8> {
        self.data.mapv(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
    }
}

/// Set of pixels a warp actually populated.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    pub data: Array2<bool>,
}

impl Mask {
    pub fn new(data: Array2<bool>) -> Self {
        Self { data }
    }

    pub fn full(width: usize, height: usize) -> Self {
        Self {
            data: Array2::from_elem((height, width), true),
        }
    }

    /// Pixels with at least one non-zero channel.
    pub fn from_nonzero(img: &RgbImage) -> Self {
        let (w, h) = img.dimensions();
        let data = Array2::from_shape_fn((h as usize, w as usize), |(row, col)| {
            img.get_pixel(col as u32, row as u32).0.iter().any(|&c| c > 0)
        });
        Self { data }
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&m| m).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|&m| m)
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> bool {
        self.data[[row, col]]
    }
}
