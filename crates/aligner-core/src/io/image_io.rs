use std::collections::HashSet;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader, RgbImage};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::consts::SUPPORTED_EXTENSIONS;
use crate::error::Result;

/// Decode any supported file into RGB8, applying its EXIF orientation.
pub fn load_rgb(path: &Path) -> Result<RgbImage> {
    let mut decoder = ImageReader::open(path)?
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    Ok(img.to_rgb8())
}

/// Write an RGB8 buffer as lossless PNG, creating parent directories.
pub fn save_png(img: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    img.save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

/// Resize to `(width, height)` with a triangle filter; returns a copy when the
/// size already matches.
pub fn downscale_to(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    if img.dimensions() == (width, height) {
        return img.clone();
    }
    imageops::resize(img, width.max(1), height.max(1), FilterType::Triangle)
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .is_some_and(|e| SUPPORTED_EXTENSIONS.contains(&e.as_str()))
}

/// Every supported image under `root`, recursively, sorted by lowercase path.
///
/// Directories listed in `exclude` (and anything below them) are skipped.
pub fn list_source_images(root: &Path, exclude: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_entry(|e| !exclude.iter().any(|x| e.path() == x.as_path()));
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && is_supported(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort_by_key(|p| p.to_string_lossy().to_lowercase());
    debug!(root = %root.display(), count = files.len(), "Listed source images");
    Ok(files)
}

/// Output file name for a moving image: `<stem>.png`.
pub fn png_name(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.png", file_stem(path)))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

/// Output names for `paths` in order. A name that is taken (by an earlier
/// path or by `reserved`, compared case-insensitively) gets `_2`, `_3`, ...
/// appended to its stem.
pub fn unique_png_names<'a>(
    paths: impl IntoIterator<Item = &'a Path>,
    reserved: &[PathBuf],
) -> Vec<PathBuf> {
    let key = |name: &Path| name.to_string_lossy().to_lowercase();
    let mut used: HashSet<String> = reserved.iter().map(|p| key(p)).collect();
    paths
        .into_iter()
        .map(|path| {
            let mut name = png_name(path);
            let mut n = 1;
            while !used.insert(key(&name)) {
                n += 1;
                name = PathBuf::from(format!("{}_{n}.png", file_stem(path)));
            }
            if n > 1 {
                warn!(
                    path = %path.display(),
                    name = %name.display(),
                    "Output name already taken, renamed"
                );
            }
            name
        })
        .collect()
}
