use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use serde::{Deserialize, Serialize};

use crate::consts::{ACTIVE_HANDLE_RADIUS, HANDLE_RADIUS};
use crate::coords::{Point, ScaleContext};
use crate::error::GeometryError;
use crate::frame::Mask;
use crate::params::AlignmentParams;
use crate::warp::{plan_warp, warp_rgb, WarpPlan, WarpedImage};

const OUTLINE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const HANDLE_COLOR: Rgb<u8> = Rgb([0, 200, 255]);
const ACTIVE_HANDLE_COLOR: Rgb<u8> = Rgb([255, 80, 40]);
const GRID_COLOR: Rgb<u8> = Rgb([128, 128, 128]);

/// How the moving image is presented over the base.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Blend onto the base instead of showing the warped image alone.
    pub overlay: bool,
    /// Weight of the moving image when blending (0.0..1.0).
    pub alpha: f32,
    /// Draw the transformed boundary (and handles while editing).
    pub outline: bool,
    /// Reference grid spacing in preview px.
    pub grid_step: Option<u32>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            overlay: false,
            alpha: 0.5,
            outline: true,
            grid_step: None,
        }
    }
}

impl RenderOptions {
    /// Bare warp for scoring and export: no blending, no annotations.
    pub fn plain() -> Self {
        Self {
            overlay: false,
            alpha: 0.5,
            outline: false,
            grid_step: None,
        }
    }
}

/// Transformed geometry handed to the UI for hit-testing and overlays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OutlineGeometry {
    /// Image boundary in preview px, TL, TR, BR, BL.
    pub corners: [Point; 4],
    /// Draggable corner positions, present only while editing perspective.
    pub handles: Option<[Point; 4]>,
    pub active_corner: usize,
}

#[derive(Clone, Debug)]
pub struct RenderOutput {
    pub image: RgbImage,
    pub coverage: Mask,
    pub outline: OutlineGeometry,
    pub geometry_error: Option<GeometryError>,
}

/// Warp `moving` into the base preview frame and decorate it.
///
/// `handles` is the active corner index when perspective editing is live.
pub fn compose_preview(
    base: &RgbImage,
    moving: &RgbImage,
    plan: &WarpPlan,
    handles: Option<usize>,
    options: &RenderOptions,
) -> RenderOutput {
    let (pw, ph) = base.dimensions();
    let warped = warp_rgb(moving, &plan.transform, pw, ph);

    let mut out = if options.overlay {
        blend_over(base, &warped, options.alpha)
    } else {
        warped.image
    };

    if let Some(step) = options.grid_step.filter(|&s| s > 0) {
        draw_grid(&mut out, step);
    }

    let active_corner = handles.unwrap_or(0).min(3);
    let handle_points = handles.map(|_| plan.outline);
    if options.outline {
        draw_polygon(&mut out, &plan.outline, OUTLINE_COLOR);
        if let Some(points) = handle_points {
            for (i, p) in points.iter().enumerate() {
                if i == active_corner {
                    fill_circle(&mut out, *p, ACTIVE_HANDLE_RADIUS, ACTIVE_HANDLE_COLOR);
                } else {
                    fill_circle(&mut out, *p, HANDLE_RADIUS, HANDLE_COLOR);
                }
            }
        }
    }

    RenderOutput {
        image: out,
        coverage: warped.coverage,
        outline: OutlineGeometry {
            corners: plan.outline,
            handles: handle_points,
            active_corner,
        },
        geometry_error: plan.geometry_error,
    }
}

/// Full-resolution warp of `moving` into the base's native frame, using the
/// preview plan lifted through `ctx`.
pub fn compose_full(moving_full: &RgbImage, plan: &WarpPlan, ctx: &ScaleContext) -> WarpedImage {
    let lifted = plan.transform.lift(ctx);
    warp_rgb(moving_full, &lifted, ctx.full_width, ctx.full_height)
}

/// Full-resolution aligned raster of one moving image.
///
/// The plan is built in preview space from the image's own preview size, then
/// lifted, so export matches what the preview showed.
pub fn render_aligned_full(
    moving_full: &RgbImage,
    params: &AlignmentParams,
    ctx: &ScaleContext,
) -> (WarpedImage, WarpPlan) {
    let (pw, ph) = ctx.preview_size_of(moving_full.width(), moving_full.height());
    let plan = plan_warp(params, pw, ph, &ctx.default_quad());
    (compose_full(moving_full, &plan, ctx), plan)
}

/// Alpha-blend the warped raster onto a copy of the base, inside its coverage only.
pub fn blend_over(base: &RgbImage, warped: &WarpedImage, alpha: f32) -> RgbImage {
    let alpha = alpha.clamp(0.0, 1.0);
    let mut out = base.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        if !warped.coverage.get(y as usize, x as usize) {
            continue;
        }
        let top = warped.image.get_pixel(x, y);
        for ch in 0..3 {
            let v = px.0[ch] as f32 * (1.0 - alpha) + top.0[ch] as f32 * alpha;
            px.0[ch] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

fn is_drawable(p: &Point) -> bool {
    p.x.is_finite() && p.y.is_finite()
}

fn draw_polygon(img: &mut RgbImage, points: &[Point; 4], color: Rgb<u8>) {
    if !points.iter().all(is_drawable) {
        return;
    }
    for i in 0..4 {
        let (a, b) = (points[i], points[(i + 1) % 4]);
        draw_line_segment_mut(
            img,
            (a.x as f32, a.y as f32),
            (b.x as f32, b.y as f32),
            color,
        );
    }
}

fn fill_circle(img: &mut RgbImage, center: Point, radius: i32, color: Rgb<u8>) {
    if is_drawable(&center) {
        let c = (center.x.round() as i32, center.y.round() as i32);
        draw_filled_circle_mut(img, c, radius, color);
    }
}

fn draw_grid(img: &mut RgbImage, step: u32) {
    let (w, h) = img.dimensions();
    let (right, bottom) = (w.saturating_sub(1) as f32, h.saturating_sub(1) as f32);
    for x in (0..w).step_by(step as usize) {
        draw_line_segment_mut(img, (x as f32, 0.0), (x as f32, bottom), GRID_COLOR);
    }
    for y in (0..h).step_by(step as usize) {
        draw_line_segment_mut(img, (0.0, y as f32), (right, y as f32), GRID_COLOR);
    }
}
