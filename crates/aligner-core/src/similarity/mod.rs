//! Multi-metric similarity between the base preview and an aligned preview.

pub mod histogram;
pub mod keypoints;
pub mod ransac;
pub mod scheduler;
pub mod ssim;
pub mod stats;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{
    DEFAULT_DEBOUNCE_MS, MIN_CORRELATION_SAMPLES, MIN_KEYPOINT_MATCHES, ORB_PYRAMID_LEVELS,
    ORB_PYRAMID_SCALE,
};
use crate::coords::Point;
use crate::error::{AlignError, Result};
use crate::frame::{Frame, Mask};
use crate::params::{AlignmentParams, Quad};
use crate::render::{compose_preview, RenderOptions};
use crate::warp::plan_warp;

pub use scheduler::{Debouncer, ScoreUpdate, ScoringJob, SimilarityScheduler};

/// Per-metric scores and their blend, all in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub ssim: f64,
    pub corr: f64,
    pub hist: f64,
    pub orb: f64,
    pub psnr: f64,
    pub score: f64,
}

impl SimilarityResult {
    /// The all-zero result reported for failed jobs.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn percent(&self) -> u32 {
        (self.score * 100.0).round().clamp(0.0, 100.0) as u32
    }

    /// One-line status text.
    pub fn summary(&self) -> String {
        format!(
            "Similarity: {}%  (SSIM {:.2} | Corr {:.2} | ORB {:.2})",
            self.percent(),
            self.ssim,
            self.corr,
            self.orb
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityWeights {
    pub ssim: f64,
    pub corr: f64,
    pub hist: f64,
    pub orb: f64,
    pub psnr: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            ssim: 0.45,
            corr: 0.20,
            hist: 0.10,
            orb: 0.15,
            psnr: 0.10,
        }
    }
}

impl SimilarityWeights {
    pub fn blend(&self, r: &SimilarityResult) -> f64 {
        let score = self.ssim * r.ssim
            + self.corr * r.corr
            + self.hist * r.hist
            + self.orb * r.orb
            + self.psnr * r.psnr;
        score.clamp(0.0, 1.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub ssim_window: usize,
    pub ssim_sigma: f32,
    pub hist_bins: [usize; 3],
    pub max_keypoints: usize,
    pub fast_threshold: u8,
    pub pyramid_levels: usize,
    pub pyramid_scale: f32,
    pub ratio_test: f32,
    pub ransac_threshold: f64,
    pub ransac_iterations: usize,
    pub min_samples: usize,
    pub min_matches: usize,
    pub debounce_ms: u64,
    pub weights: SimilarityWeights,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            ssim_window: 11,
            ssim_sigma: 1.5,
            hist_bins: [30, 32, 32],
            max_keypoints: 500,
            fast_threshold: 20,
            pyramid_levels: ORB_PYRAMID_LEVELS,
            pyramid_scale: ORB_PYRAMID_SCALE,
            ratio_test: 0.75,
            ransac_threshold: 3.0,
            ransac_iterations: 2000,
            min_samples: MIN_CORRELATION_SAMPLES,
            min_matches: MIN_KEYPOINT_MATCHES,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            weights: SimilarityWeights::default(),
        }
    }
}

/// Score an aligned preview against the base, restricted to its non-black pixels.
pub fn compute_metrics(
    base: &RgbImage,
    aligned: &RgbImage,
    config: &SimilarityConfig,
) -> Result<SimilarityResult> {
    compute_metrics_masked(base, aligned, &Mask::from_nonzero(aligned), config)
}

/// Score an aligned preview against the base inside `mask`.
pub fn compute_metrics_masked(
    base: &RgbImage,
    aligned: &RgbImage,
    mask: &Mask,
    config: &SimilarityConfig,
) -> Result<SimilarityResult> {
    let (w, h) = base.dimensions();
    if aligned.dimensions() != (w, h) || mask.data.dim() != (h as usize, w as usize) {
        return Err(AlignError::InvalidDimensions {
            width: aligned.width(),
            height: aligned.height(),
        });
    }

    let gx = Frame::from_rgb(base);
    let gy = Frame::from_rgb(aligned);

    let mut r = SimilarityResult {
        ssim: ssim::ssim(&gx, &gy, mask, config.ssim_window, config.ssim_sigma),
        corr: stats::correlation(&gx, &gy, mask, config.min_samples),
        hist: histogram::histogram_similarity(base, aligned, mask, config.hist_bins),
        orb: keypoint_inlier_ratio(&gx, &gy, mask, config),
        psnr: stats::psnr_normalized(base, aligned, mask),
        score: 0.0,
    };
    r.score = config.weights.blend(&r);
    debug!(
        score = r.score,
        ssim = r.ssim,
        corr = r.corr,
        hist = r.hist,
        orb = r.orb,
        psnr = r.psnr,
        "Similarity computed"
    );
    Ok(r)
}

/// Warp `moving` by `params` into the base preview frame and score it,
/// masked by the warp's coverage.
pub fn compute_for_params(
    base: &RgbImage,
    moving: &RgbImage,
    params: &AlignmentParams,
    default_quad: &Quad,
    config: &SimilarityConfig,
) -> Result<SimilarityResult> {
    let plan = plan_warp(params, moving.width(), moving.height(), default_quad);
    let out = compose_preview(base, moving, &plan, None, &RenderOptions::plain());
    compute_metrics_masked(base, &out.image, &out.coverage, config)
}

/// Fraction of ratio-test matches that agree with a RANSAC homography.
///
/// Too few keypoints on either side or too few matches score 0.
pub fn keypoint_inlier_ratio(
    base: &Frame,
    aligned: &Frame,
    mask: &Mask,
    config: &SimilarityConfig,
) -> f64 {
    let detector = keypoints::OrbDetector::new(config.max_keypoints, config.fast_threshold)
        .with_pyramid(config.pyramid_levels, config.pyramid_scale);
    let kb = detector.detect(base, mask);
    let ka = detector.detect(aligned, mask);
    if kb.len() < config.min_matches || ka.len() < config.min_matches {
        return 0.0;
    }

    let good = keypoints::match_features(&kb, &ka, config.ratio_test);
    if good.len() < config.min_matches {
        return 0.0;
    }

    let to_point = |kp: &keypoints::Keypoint| Point::new(kp.x as f64, kp.y as f64);
    let src: Vec<Point> = good.iter().map(|m| to_point(&kb[m.query].keypoint)).collect();
    let dst: Vec<Point> = good.iter().map(|m| to_point(&ka[m.train].keypoint)).collect();

    match ransac::find_homography(&src, &dst, config.ransac_threshold, config.ransac_iterations) {
        Some(fit) => fit.inlier_count() as f64 / good.len().max(1) as f64,
        None => 0.0,
    }
}
