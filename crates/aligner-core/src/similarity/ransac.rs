use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::coords::Point;
use crate::warp::Homography;

const RANSAC_SEED: u64 = 0x5eed_0003;
const CONFIDENCE: f64 = 0.995;

#[derive(Clone, Debug)]
pub struct RansacResult {
    pub homography: Homography,
    pub inliers: Vec<bool>,
}

impl RansacResult {
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&b| b).count()
    }
}

/// Robust homography from point pairs by four-point RANSAC.
///
/// Uses a fixed seed so repeated runs agree. The iteration budget shrinks
/// adaptively once a model explains enough of the data.
pub fn find_homography(
    src: &[Point],
    dst: &[Point],
    threshold: f64,
    max_iterations: usize,
) -> Option<RansacResult> {
    let n = src.len().min(dst.len());
    if n < 4 {
        return None;
    }
    let threshold_sq = threshold * threshold;
    let mut rng = StdRng::seed_from_u64(RANSAC_SEED);

    let mut best: Option<(Homography, usize)> = None;
    let mut budget = max_iterations.max(1);
    let mut iteration = 0;
    while iteration < budget {
        iteration += 1;
        let sample = index::sample(&mut rng, n, 4);
        let pick = |pts: &[Point]| -> [Point; 4] {
            [0, 1, 2, 3].map(|k| pts[sample.index(k)])
        };
        let Some(h) = Homography::from_point_pairs(&pick(src), &pick(dst)) else {
            continue;
        };

        let count = count_inliers(&h, &src[..n], &dst[..n], threshold_sq);
        if best.as_ref().map_or(true, |(_, c)| count > *c) {
            best = Some((h, count));
            budget = budget.min(adaptive_budget(count, n, max_iterations));
        }
    }

    let (homography, _) = best?;
    let inliers = src[..n]
        .iter()
        .zip(&dst[..n])
        .map(|(s, d)| reprojection_error_sq(&homography, s, d) <= threshold_sq)
        .collect();
    Some(RansacResult {
        homography,
        inliers,
    })
}

fn count_inliers(h: &Homography, src: &[Point], dst: &[Point], threshold_sq: f64) -> usize {
    src.iter()
        .zip(dst)
        .filter(|(s, d)| reprojection_error_sq(h, s, d) <= threshold_sq)
        .count()
}

fn reprojection_error_sq(h: &Homography, s: &Point, d: &Point) -> f64 {
    h.apply(*s).map_or(f64::INFINITY, |p| p.distance_sq(d))
}

/// Iterations needed to draw one all-inlier sample with `CONFIDENCE`.
fn adaptive_budget(inliers: usize, total: usize, cap: usize) -> usize {
    let w = inliers as f64 / total as f64;
    let p_good = w.powi(4);
    if p_good >= 1.0 {
        return 1;
    }
    if p_good <= 0.0 {
        return cap;
    }
    let needed = (1.0 - CONFIDENCE).ln() / (1.0 - p_good).ln();
    if needed.is_finite() {
        (needed.ceil() as usize).clamp(1, cap)
    } else {
        cap
    }
}
