use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

/// Smoothly varying RGB texture with a few sharp blobs.
///
/// Every channel stays in `[20, 235]`, so no pixel is black and masks built
/// from non-zero pixels cover the whole frame.
pub fn textured_rgb(width: u32, height: u32, seed: u32) -> RgbImage {
    let phase = seed as f64 * 0.7;
    RgbImage::from_fn(width, height, |x, y| {
        let fx = x as f64;
        let fy = y as f64;
        let wave = (fx * 0.11 + phase).sin() * (fy * 0.07 - phase).cos();
        let ring = ((fx - width as f64 * 0.4).hypot(fy - height as f64 * 0.6) * 0.15).sin();
        let blob = if ((x / 9 + y / 7 + seed) % 5) == 0 { 40.0 } else { 0.0 };
        let r = 128.0 + 70.0 * wave + blob;
        let g = 128.0 + 60.0 * ring - blob * 0.5;
        let b = 128.0 + 35.0 * (wave - ring);
        Rgb([clamp_u8(r), clamp_u8(g), clamp_u8(b)])
    })
}

pub fn solid_rgb(width: u32, height: u32, value: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([value, value, value]))
}

fn clamp_u8(v: f64) -> u8 {
    v.round().clamp(20.0, 235.0) as u8
}

/// Write `img` as PNG under `dir`, creating parents, and return its path.
pub fn write_png(dir: &Path, name: &str, img: &RgbImage) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    img.save(&path).expect("write test png");
    path
}
