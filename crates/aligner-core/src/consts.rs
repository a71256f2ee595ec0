/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-10;

/// ITU-R BT.601 luminance coefficient for the red channel.
pub const LUMINANCE_R: f32 = 0.299;

/// ITU-R BT.601 luminance coefficient for the green channel.
pub const LUMINANCE_G: f32 = 0.587;

/// ITU-R BT.601 luminance coefficient for the blue channel.
pub const LUMINANCE_B: f32 = 0.114;

/// Default longest side of the preview raster.
pub const DEFAULT_PREVIEW_MAX_SIDE: u32 = 1600;

/// Lower bound of the per-image scale parameter.
pub const SCALE_MIN: f64 = 0.8;

/// Upper bound of the per-image scale parameter.
pub const SCALE_MAX: f64 = 1.2;

/// Per-coordinate tolerance when comparing a quad against the default rectangle.
pub const QUAD_EPSILON: f64 = 1e-3;

/// Minimum absolute area (preview px²) of a quad usable as a homography target.
pub const MIN_QUAD_AREA: f64 = 1e-3;

/// Default number of undo snapshots kept per image.
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Radius (draw px) within which a click grabs a perspective corner.
pub const CORNER_PICK_RADIUS: f64 = 16.0;

/// Radius (px) of a perspective corner handle.
pub const HANDLE_RADIUS: i32 = 6;

/// Radius (px) of the active perspective corner handle.
pub const ACTIVE_HANDLE_RADIUS: i32 = 9;

/// Interval of the similarity debounce check, in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 180;

/// Minimum masked sample count for Pearson correlation.
pub const MIN_CORRELATION_SAMPLES: usize = 16;

/// PSNR (dB) that maps to a normalised score of 1.0.
pub const PSNR_CEILING_DB: f64 = 60.0;

/// Mean-squared error below which two rasters count as identical.
pub const MSE_FLOOR: f64 = 1e-10;

/// Minimum keypoints per image and good matches for the inlier ratio.
pub const MIN_KEYPOINT_MATCHES: usize = 8;

/// Pyramid levels searched for keypoints.
pub const ORB_PYRAMID_LEVELS: usize = 8;

/// Linear downscale between consecutive keypoint pyramid levels.
pub const ORB_PYRAMID_SCALE: f32 = 1.2;

/// Anti-alias blur applied before each pyramid downscale.
pub const ORB_PYRAMID_BLUR_SIGMA: f32 = 0.6;

/// File extensions accepted as moving images (lower-case, no dot).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "jpe", "png"];
