//! Preview ↔ full-resolution coordinate spaces.
//!
//! Interactive editing happens on a downscaled copy of every image. The scale
//! factor `s` is fixed by the base image and shared by every moving image, so a
//! transform defined in preview space converts to full resolution by
//! conjugation with `S = diag(s, s, 1)`:
//!
//! ```text
//! Full = S⁻¹ · Small · S
//! ```
//!
//! Only the translation column changes; rotation, scale and shear carry over.

use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

use crate::error::{AlignError, Result};
use crate::warp::matrix::{Affine2, Homography};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_sq(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Axis-aligned rectangle with floating-point origin and size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle spanned by two corner points in any order.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    pub fn scaled(&self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.width * k, self.height * k)
    }
}

/// Fixed mapping between a base image's native size and its preview.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleContext {
    pub full_width: u32,
    pub full_height: u32,
    pub preview_scale: f64,
    pub preview_width: u32,
    pub preview_height: u32,
}

impl ScaleContext {
    pub fn new(full_width: u32, full_height: u32, max_preview_side: u32) -> Result<Self> {
        if full_width == 0 || full_height == 0 || max_preview_side == 0 {
            return Err(AlignError::InvalidDimensions {
                width: full_width,
                height: full_height,
            });
        }
        let preview_scale = uniform_preview_scale(full_width, full_height, max_preview_side);
        Ok(Self {
            full_width,
            full_height,
            preview_scale,
            preview_width: scaled_side(full_width, preview_scale),
            preview_height: scaled_side(full_height, preview_scale),
        })
    }

    pub fn preview_size(&self) -> (u32, u32) {
        (self.preview_width, self.preview_height)
    }

    /// Preview size of an arbitrary image downscaled with this context's factor.
    pub fn preview_size_of(&self, width: u32, height: u32) -> (u32, u32) {
        (
            scaled_side(width, self.preview_scale),
            scaled_side(height, self.preview_scale),
        )
    }

    /// The untouched perspective target: the preview frame's own corners.
    pub fn default_quad(&self) -> [Point; 4] {
        rect_corners(self.preview_width, self.preview_height)
    }

    pub fn to_preview(&self, full: &Rect) -> Rect {
        full.scaled(self.preview_scale)
    }

    pub fn to_full(&self, preview: &Rect) -> Rect {
        preview.scaled(1.0 / self.preview_scale)
    }

    pub fn point_to_full(&self, p: Point) -> Point {
        Point::new(p.x / self.preview_scale, p.y / self.preview_scale)
    }

    pub fn lift_affine_to_full(&self, small: &Affine2) -> Affine2 {
        Affine2::from_homogeneous(&self.conjugate(&small.to_homogeneous(), self.preview_scale))
    }

    pub fn lift_homography_to_full(&self, small: &Homography) -> Homography {
        Homography::new(self.conjugate(&small.m, self.preview_scale)).normalized()
    }

    /// `diag(1/k, 1/k, 1) · m · diag(k, k, 1)`
    fn conjugate(&self, m: &Matrix3<f64>, k: f64) -> Matrix3<f64> {
        let s = Matrix3::new(k, 0.0, 0.0, 0.0, k, 0.0, 0.0, 0.0, 1.0);
        let s_inv = Matrix3::new(1.0 / k, 0.0, 0.0, 0.0, 1.0 / k, 0.0, 0.0, 0.0, 1.0);
        s_inv * m * s
    }
}

/// `min(1, max_side / max(w, h))`
pub fn uniform_preview_scale(width: u32, height: u32, max_side: u32) -> f64 {
    let m = width.max(height);
    if m <= max_side {
        1.0
    } else {
        max_side as f64 / m as f64
    }
}

fn scaled_side(side: u32, scale: f64) -> u32 {
    ((side as f64 * scale).round() as u32).max(1)
}

/// Corners `(0,0), (w-1,0), (w-1,h-1), (0,h-1)` of a raster.
pub fn rect_corners(width: u32, height: u32) -> [Point; 4] {
    let w = width as f64 - 1.0;
    let h = height as f64 - 1.0;
    [
        Point::new(0.0, 0.0),
        Point::new(w, 0.0),
        Point::new(w, h),
        Point::new(0.0, h),
    ]
}

/// Placement of preview content on screen: draw px = (preview px - pan) · draw_scale.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    pub draw_scale: f64,
    /// Pan offset in preview px.
    pub pan_x: f64,
    pub pan_y: f64,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self {
            draw_scale: 1.0,
            pan_x: 0.0,
            pan_y: 0.0,
        }
    }
}

impl ViewTransform {
    pub fn new(draw_scale: f64, pan_x: f64, pan_y: f64) -> Self {
        Self {
            draw_scale,
            pan_x,
            pan_y,
        }
    }

    pub fn draw_to_preview(&self, p: Point) -> Point {
        Point::new(
            p.x / self.draw_scale + self.pan_x,
            p.y / self.draw_scale + self.pan_y,
        )
    }

    pub fn preview_to_draw(&self, p: Point) -> Point {
        Point::new(
            (p.x - self.pan_x) * self.draw_scale,
            (p.y - self.pan_y) * self.draw_scale,
        )
    }
}
