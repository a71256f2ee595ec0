//! Oriented FAST keypoints with steered binary descriptors.
//!
//! Detection runs FAST-9 on every level of a scale pyramid, keeps the
//! strongest corners per level after grid suppression, assigns each an
//! intensity-centroid orientation and describes it with 256 rotated
//! pixel-pair comparisons on a smoothed copy of its level. Keypoint
//! coordinates are reported in level-0 pixels. The comparison pattern comes
//! from a fixed-seed generator, so descriptors are reproducible across runs.

use std::cmp::Ordering;
use std::collections::HashSet;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::consts::{
    ORB_PYRAMID_BLUR_SIGMA, ORB_PYRAMID_LEVELS, ORB_PYRAMID_SCALE, PARALLEL_PIXEL_THRESHOLD,
};
use crate::filters::gaussian_blur::gaussian_blur_window;
use crate::frame::{Frame, Mask};

pub type Descriptor = [u8; 32];

const PATTERN_SEED: u64 = 0x0b5e_ed01;
const PATTERN_EXTENT: i32 = 13;
const PATCH_RADIUS: i32 = 15;
const BORDER: usize = PATCH_RADIUS as usize + 1;
const SUPPRESSION_CELL: f32 = 5.0;

const FAST_CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub response: f32,
    /// Radians.
    pub angle: f32,
    /// Pyramid level the keypoint was found on.
    pub octave: usize,
}

#[derive(Clone, Debug)]
pub struct Feature {
    pub keypoint: Keypoint,
    pub descriptor: Descriptor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureMatch {
    pub query: usize,
    pub train: usize,
    pub distance: u32,
}

#[derive(Clone, Debug)]
pub struct OrbDetector {
    pub max_keypoints: usize,
    pub fast_threshold: u8,
    pub levels: usize,
    pub scale_factor: f32,
    pattern: Vec<[i32; 4]>,
}

impl OrbDetector {
    pub fn new(max_keypoints: usize, fast_threshold: u8) -> Self {
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
        let pattern = (0..256)
            .map(|_| {
                [0; 4].map(|_: i32| rng.random_range(-PATTERN_EXTENT..=PATTERN_EXTENT))
            })
            .collect();
        Self {
            max_keypoints,
            fast_threshold,
            levels: ORB_PYRAMID_LEVELS,
            scale_factor: ORB_PYRAMID_SCALE,
            pattern,
        }
    }

    /// Override the pyramid shape; one level disables it.
    pub fn with_pyramid(mut self, levels: usize, scale_factor: f32) -> Self {
        self.levels = levels.max(1);
        self.scale_factor = scale_factor.max(1.0);
        self
    }

    /// Keypoints whose centre lies inside `mask`, finest level first.
    pub fn detect(&self, frame: &Frame, mask: &Mask) -> Vec<Feature> {
        let (h0, w0) = frame.data.dim();
        let mut features = Vec::new();
        let mut level_data = frame.data.clone();

        for (level, budget) in self.level_budgets().into_iter().enumerate() {
            let scale = self.scale_factor.powi(level as i32);
            if level > 0 {
                let h = (h0 as f32 / scale).round() as usize;
                let w = (w0 as f32 / scale).round() as usize;
                if w <= 2 * BORDER || h <= 2 * BORDER {
                    break;
                }
                let blurred = gaussian_blur_window(&level_data, 5, ORB_PYRAMID_BLUR_SIGMA);
                level_data = resize_plane(&blurred, h, w);
            }
            let (h, w) = level_data.dim();
            if budget == 0 || w <= 2 * BORDER || h <= 2 * BORDER {
                continue;
            }
            let level_mask = if level == 0 {
                mask.clone()
            } else {
                resize_mask(mask, h, w)
            };
            let level_frame = Frame::new(level_data.clone());
            features.extend(self.detect_level(&level_frame, &level_mask, level, budget));
        }
        features
    }

    /// Keypoint budget per level, shrinking geometrically with the level area
    /// and summing to `max_keypoints`.
    fn level_budgets(&self) -> Vec<usize> {
        let levels = self.levels.max(1);
        if levels == 1 || self.scale_factor <= 1.0 {
            return vec![self.max_keypoints];
        }
        let factor = 1.0 / self.scale_factor as f64;
        let first = self.max_keypoints as f64 * (1.0 - factor) / (1.0 - factor.powi(levels as i32));
        let mut budgets = Vec::with_capacity(levels);
        let mut remaining = self.max_keypoints;
        for level in 0..levels - 1 {
            let n = ((first * factor.powi(level as i32)).round() as usize).min(remaining);
            budgets.push(n);
            remaining -= n;
        }
        budgets.push(remaining);
        budgets
    }

    /// Detect and describe on one level; coordinates come back in level-0 px.
    fn detect_level(
        &self,
        frame: &Frame,
        mask: &Mask,
        level: usize,
        budget: usize,
    ) -> Vec<Feature> {
        let scale = self.scale_factor.powi(level as i32);
        let gray = frame.to_u8();
        let corners = self.detect_corners(&gray, mask, budget);
        let smoothed = gaussian_blur_window(&frame.data, 7, 2.0);

        corners
            .into_iter()
            .map(|mut kp| {
                kp.angle = orientation(&gray, kp.x as usize, kp.y as usize);
                let descriptor = self.describe(&smoothed, &kp);
                kp.x *= scale;
                kp.y *= scale;
                kp.octave = level;
                Feature {
                    descriptor,
                    keypoint: kp,
                }
            })
            .collect()
    }

    fn detect_corners(&self, gray: &Array2<u8>, mask: &Mask, budget: usize) -> Vec<Keypoint> {
        let (h, w) = gray.dim();
        let t = self.fast_threshold;
        let scan_row = |y: usize| -> Vec<Keypoint> {
            (BORDER..w - BORDER)
                .filter(|&x| mask.get(y, x) && is_fast_corner(gray, x, y, t))
                .map(|x| Keypoint {
                    x: x as f32,
                    y: y as f32,
                    response: corner_response(gray, x, y),
                    angle: 0.0,
                    octave: 0,
                })
                .collect()
        };

        let rows = BORDER..h - BORDER;
        let corners: Vec<Keypoint> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
            rows.into_par_iter().flat_map(scan_row).collect()
        } else {
            rows.flat_map(scan_row).collect()
        };
        suppress(corners, budget)
    }

    fn describe(&self, smoothed: &Array2<f32>, kp: &Keypoint) -> Descriptor {
        let (h, w) = smoothed.dim();
        let (sin, cos) = kp.angle.sin_cos();
        let sample = |dx: i32, dy: i32| -> f32 {
            let rx = (dx as f32 * cos - dy as f32 * sin).round() as i64;
            let ry = (dx as f32 * sin + dy as f32 * cos).round() as i64;
            let x = (kp.x as i64 + rx).clamp(0, w as i64 - 1) as usize;
            let y = (kp.y as i64 + ry).clamp(0, h as i64 - 1) as usize;
            smoothed[[y, x]]
        };

        let mut descriptor = [0u8; 32];
        for (byte, tests) in descriptor.iter_mut().zip(self.pattern.chunks(8)) {
            for (bit, &[x1, y1, x2, y2]) in tests.iter().enumerate() {
                if sample(x1, y1) < sample(x2, y2) {
                    *byte |= 1 << bit;
                }
            }
        }
        descriptor
    }
}

/// Strongest-first grid suppression, capped at `budget`.
fn suppress(mut corners: Vec<Keypoint>, budget: usize) -> Vec<Keypoint> {
    corners.sort_by(|a, b| {
        b.response
            .partial_cmp(&a.response)
            .unwrap_or(Ordering::Equal)
    });

    let mut taken = HashSet::new();
    let mut selected = Vec::new();
    for kp in corners {
        if selected.len() >= budget {
            break;
        }
        let gx = (kp.x / SUPPRESSION_CELL) as i32;
        let gy = (kp.y / SUPPRESSION_CELL) as i32;
        let blocked = (-1..=1).any(|dy| (-1..=1).any(|dx| taken.contains(&(gx + dx, gy + dy))));
        if blocked {
            continue;
        }
        taken.insert((gx, gy));
        selected.push(kp);
    }
    selected
}

/// Bilinear resample of a plane to `(h, w)`, pixel centres aligned.
fn resize_plane(data: &Array2<f32>, h: usize, w: usize) -> Array2<f32> {
    let (sh, sw) = data.dim();
    let sy = sh as f32 / h as f32;
    let sx = sw as f32 / w as f32;
    Array2::from_shape_fn((h, w), |(row, col)| {
        let fy = ((row as f32 + 0.5) * sy - 0.5).clamp(0.0, (sh - 1) as f32);
        let fx = ((col as f32 + 0.5) * sx - 0.5).clamp(0.0, (sw - 1) as f32);
        let (y0, x0) = (fy as usize, fx as usize);
        let (y1, x1) = ((y0 + 1).min(sh - 1), (x0 + 1).min(sw - 1));
        let (ty, tx) = (fy - y0 as f32, fx - x0 as f32);
        let top = data[[y0, x0]] * (1.0 - tx) + data[[y0, x1]] * tx;
        let bottom = data[[y1, x0]] * (1.0 - tx) + data[[y1, x1]] * tx;
        top * (1.0 - ty) + bottom * ty
    })
}

/// Nearest-neighbour resample of a mask to `(h, w)`.
fn resize_mask(mask: &Mask, h: usize, w: usize) -> Mask {
    let (sh, sw) = mask.data.dim();
    Mask::new(Array2::from_shape_fn((h, w), |(row, col)| {
        let r = ((row * sh) / h).min(sh - 1);
        let c = ((col * sw) / w).min(sw - 1);
        mask.get(r, c)
    }))
}

/// Nine contiguous circle pixels all brighter or all darker than the centre.
fn is_fast_corner(gray: &Array2<u8>, x: usize, y: usize, threshold: u8) -> bool {
    let center = gray[[y, x]];
    let bright = center.saturating_add(threshold);
    let dark = center.saturating_sub(threshold);

    let mut run_bright = 0;
    let mut run_dark = 0;
    for i in 0..FAST_CIRCLE.len() + 9 {
        let (dx, dy) = FAST_CIRCLE[i % FAST_CIRCLE.len()];
        let p = gray[[(y as i32 + dy) as usize, (x as i32 + dx) as usize]];
        if p > bright {
            run_bright += 1;
            run_dark = 0;
        } else if p < dark {
            run_dark += 1;
            run_bright = 0;
        } else {
            run_bright = 0;
            run_dark = 0;
        }
        if run_bright >= 9 || run_dark >= 9 {
            return true;
        }
    }
    false
}

/// Local contrast (standard deviation) of the 5×5 neighbourhood.
fn corner_response(gray: &Array2<u8>, x: usize, y: usize) -> f32 {
    let mut sum = 0.0f32;
    let mut sum_sq = 0.0f32;
    for yy in y - 2..=y + 2 {
        for xx in x - 2..=x + 2 {
            let v = gray[[yy, xx]] as f32;
            sum += v;
            sum_sq += v * v;
        }
    }
    let mean = sum / 25.0;
    (sum_sq / 25.0 - mean * mean).max(0.0).sqrt()
}

/// Angle of the intensity centroid within the circular patch.
fn orientation(gray: &Array2<u8>, x: usize, y: usize) -> f32 {
    let (h, w) = gray.dim();
    let mut m01 = 0.0f32;
    let mut m10 = 0.0f32;
    for dy in -PATCH_RADIUS..=PATCH_RADIUS {
        for dx in -PATCH_RADIUS..=PATCH_RADIUS {
            if dx * dx + dy * dy > PATCH_RADIUS * PATCH_RADIUS {
                continue;
            }
            let px = x as i32 + dx;
            let py = y as i32 + dy;
            if px < 0 || py < 0 || px as usize >= w || py as usize >= h {
                continue;
            }
            let v = gray[[py as usize, px as usize]] as f32;
            m10 += v * dx as f32;
            m01 += v * dy as f32;
        }
    }
    m01.atan2(m10)
}

pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Two-nearest-neighbour Hamming matching with Lowe's ratio test.
pub fn match_features(query: &[Feature], train: &[Feature], ratio: f32) -> Vec<FeatureMatch> {
    if train.len() < 2 {
        return Vec::new();
    }
    query
        .iter()
        .enumerate()
        .filter_map(|(qi, q)| {
            let mut best = (u32::MAX, 0usize);
            let mut second = u32::MAX;
            for (ti, t) in train.iter().enumerate() {
                let d = hamming(&q.descriptor, &t.descriptor);
                if d < best.0 {
                    second = best.0;
                    best = (d, ti);
                } else if d < second {
                    second = d;
                }
            }
            ((best.0 as f32) < ratio * second as f32).then_some(FeatureMatch {
                query: qi,
                train: best.1,
                distance: best.0,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_is_deterministic() {
        let a = OrbDetector::new(500, 20);
        let b = OrbDetector::new(500, 20);
        assert_eq!(a.pattern, b.pattern);
        assert_eq!(a.pattern.len(), 256);
    }

    #[test]
    fn test_fast_finds_isolated_bright_dot() {
        let mut gray = Array2::<u8>::from_elem((9, 9), 10);
        gray[[4, 4]] = 200;
        assert!(is_fast_corner(&gray, 4, 4, 20));
        gray[[4, 4]] = 10;
        assert!(!is_fast_corner(&gray, 4, 4, 20));
    }

    #[test]
    fn test_hamming() {
        let a = [0u8; 32];
        let mut b = [0u8; 32];
        b[0] = 0b1011;
        b[31] = 0xff;
        assert_eq!(hamming(&a, &b), 11);
    }

    #[test]
    fn test_tiny_frame_has_no_keypoints() {
        let f = Frame::new(Array2::from_elem((20, 20), 0.5));
        let det = OrbDetector::new(500, 20);
        assert!(det.detect(&f, &Mask::full(20, 20)).is_empty());
    }

    fn block_frame(size: usize, block: usize) -> Frame {
        Frame::new(Array2::from_shape_fn((size, size), |(y, x)| {
            let (bx, by) = (x / block, y / block);
            ((bx * 7919 + by * 104_729) % 251) as f32 / 255.0
        }))
    }

    #[test]
    fn test_level_budgets_shrink_and_sum_to_cap() {
        let det = OrbDetector::new(500, 20).with_pyramid(8, 1.2);
        let budgets = det.level_budgets();
        assert_eq!(budgets.len(), 8);
        assert_eq!(budgets.iter().sum::<usize>(), 500);
        assert!(budgets.windows(2).take(6).all(|w| w[0] >= w[1]));
        assert!(budgets[0] > budgets[7]);

        let flat = OrbDetector::new(500, 20).with_pyramid(1, 1.2);
        assert_eq!(flat.level_budgets(), vec![500]);
    }

    #[test]
    fn test_pyramid_keypoints_in_base_coordinates() {
        let f = block_frame(240, 8);
        let det = OrbDetector::new(400, 20);
        let features = det.detect(&f, &Mask::full(240, 240));

        assert!(!features.is_empty());
        assert!(features.len() <= 400);
        assert!(features.iter().any(|ft| ft.keypoint.octave > 0));
        for ft in &features {
            let kp = ft.keypoint;
            assert!(kp.x >= 0.0 && kp.x < 240.0 && kp.y >= 0.0 && kp.y < 240.0);
        }
    }

    #[test]
    fn test_single_level_matches_base_only() {
        let f = block_frame(240, 8);
        let det = OrbDetector::new(400, 20).with_pyramid(1, 1.2);
        let features = det.detect(&f, &Mask::full(240, 240));
        assert!(!features.is_empty());
        assert!(features.iter().all(|ft| ft.keypoint.octave == 0));
    }

    #[test]
    fn test_resize_plane_keeps_constant_and_shape() {
        let plane = Array2::from_elem((60, 90), 0.25f32);
        let small = resize_plane(&plane, 50, 75);
        assert_eq!(small.dim(), (50, 75));
        assert!(small.iter().all(|&v| (v - 0.25).abs() < 1e-6));
    }
}
