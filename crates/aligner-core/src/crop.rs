//! Crop region mapping (draw → preview → full resolution) and batch crop.

use std::path::{Path, PathBuf};

use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::coords::{Point, Rect, ScaleContext, ViewTransform};
use crate::error::Result;
use crate::io::{load_rgb, png_name, save_png, unique_png_names};
use crate::params::AlignmentParams;
use crate::render::render_aligned_full;

/// A rectangle in full-resolution image coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Intersection with a `width × height` image, `None` if empty.
    pub fn clipped_to(&self, width: u32, height: u32) -> Option<CropRect> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(CropRect::new(self.x, self.y, w, h))
    }

    pub fn apply(&self, img: &RgbImage) -> Option<RgbImage> {
        let r = self.clipped_to(img.width(), img.height())?;
        Some(imageops::crop_imm(img, r.x, r.y, r.width, r.height).to_image())
    }
}

/// Which version of each moving image gets cropped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropTarget {
    #[default]
    Aligned,
    Source,
}

impl std::fmt::Display for CropTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aligned => write!(f, "aligned"),
            Self::Source => write!(f, "source"),
        }
    }
}

impl std::str::FromStr for CropTarget {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aligned" => Ok(Self::Aligned),
            "source" => Ok(Self::Source),
            other => Err(format!("unknown crop target '{other}'")),
        }
    }
}

/// A rectangle selected on screen plus the view it was drawn in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropRequest {
    /// Draw-space rectangle.
    pub rect: Rect,
    pub view: ViewTransform,
    pub target: CropTarget,
}

/// Map a draw-space rectangle to full-resolution pixels of the base.
///
/// The result always lies inside the base and is at least 2×2.
pub fn map_draw_rect_to_full(rect: &Rect, view: &ViewTransform, ctx: &ScaleContext) -> CropRect {
    let a = view.draw_to_preview(Point::new(rect.x, rect.y));
    let b = view.draw_to_preview(Point::new(rect.x + rect.width, rect.y + rect.height));
    let preview = Rect::from_corners(a, b);
    let full = ctx.to_full(&preview);

    let bw = ctx.full_width as i64;
    let bh = ctx.full_height as i64;
    let round = |v: f64| if v.is_finite() { v.round() as i64 } else { 0 };

    let x = round(full.x).clamp(0, (bw - 2).max(0));
    let y = round(full.y).clamp(0, (bh - 2).max(0));
    let w = round(full.width).min(bw - x).max(2);
    let h = round(full.height).min(bh - y).max(2);
    CropRect::new(x as u32, y as u32, w as u32, h as u32)
}

/// Inverse of [`map_draw_rect_to_full`], for drawing a stored region.
pub fn map_full_rect_to_draw(rect: &CropRect, view: &ViewTransform, ctx: &ScaleContext) -> Rect {
    let full = Rect::new(
        rect.x as f64,
        rect.y as f64,
        rect.width as f64,
        rect.height as f64,
    );
    let preview = ctx.to_preview(&full);
    let a = view.preview_to_draw(Point::new(preview.x, preview.y));
    let b = view.preview_to_draw(Point::new(
        preview.x + preview.width,
        preview.y + preview.height,
    ));
    Rect::from_corners(a, b)
}

/// Moving image to crop, with the params used for the on-the-fly warp.
#[derive(Clone, Debug)]
pub struct CropItem {
    pub path: PathBuf,
    pub params: AlignmentParams,
}

/// Everything a batch crop reads from and writes to.
pub struct CropContext<'a> {
    pub base_path: Option<&'a Path>,
    pub base_full: &'a RgbImage,
    pub scale: &'a ScaleContext,
    pub align_out: Option<&'a Path>,
    pub crop_out: &'a Path,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CropSummary {
    pub rect: Option<CropRect>,
    pub total: usize,
    pub written: usize,
    pub skipped: usize,
    /// Aligned crops that had to warp the source because no export existed.
    pub warped_on_the_fly: usize,
}

/// Crop the base and every item to `rect` (full-resolution base pixels).
///
/// `progress` is called with `(done, total)` after each item, including
/// items that could not be read.
pub fn execute_crop(
    rect: CropRect,
    target: CropTarget,
    ctx: &CropContext<'_>,
    items: &[CropItem],
    mut progress: impl FnMut(usize, usize),
) -> Result<CropSummary> {
    std::fs::create_dir_all(ctx.crop_out)?;

    let base_name = ctx
        .base_path
        .map(png_name)
        .unwrap_or_else(|| PathBuf::from("base.png"));
    if let Some(base_crop) = rect.apply(ctx.base_full) {
        save_png(&base_crop, &ctx.crop_out.join(&base_name))?;
    }

    let total = items.len();
    let mut summary = CropSummary {
        rect: Some(rect),
        total,
        ..Default::default()
    };

    let paths = || items.iter().map(|item| item.path.as_path());
    let export_names = unique_png_names(paths(), &[]);
    let crop_names = unique_png_names(paths(), std::slice::from_ref(&base_name));

    for (i, item) in items.iter().enumerate() {
        let source = match target {
            CropTarget::Aligned => aligned_raster(ctx, item, &export_names[i], &mut summary),
            CropTarget::Source => load_rgb(&item.path).ok(),
        };

        let written = source
            .as_ref()
            .and_then(|img| rect.apply(img))
            .map(|crop| save_png(&crop, &ctx.crop_out.join(&crop_names[i])));
        match written {
            Some(Ok(())) => summary.written += 1,
            Some(Err(e)) => {
                warn!(path = %item.path.display(), error = %e, "Failed to write crop");
                summary.skipped += 1;
            }
            None => {
                debug!(path = %item.path.display(), "Nothing to crop, skipping");
                summary.skipped += 1;
            }
        }
        progress(i + 1, total);
    }

    info!(
        crop_target = %target,
        written = summary.written,
        skipped = summary.skipped,
        out = %ctx.crop_out.display(),
        "Crop finished"
    );
    Ok(summary)
}

fn aligned_raster(
    ctx: &CropContext<'_>,
    item: &CropItem,
    name: &Path,
    summary: &mut CropSummary,
) -> Option<RgbImage> {
    if let Some(img) = ctx.align_out.and_then(|dir| load_rgb(&dir.join(name)).ok()) {
        return Some(img);
    }
    match load_rgb(&item.path) {
        Ok(full) => {
            summary.warped_on_the_fly += 1;
            Some(render_aligned_full(&full, &item.params, ctx.scale).0.image)
        }
        Err(e) => {
            warn!(path = %item.path.display(), error = %e, "Unreadable source, skipping");
            None
        }
    }
}
