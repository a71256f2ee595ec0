use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::consts::{QUAD_EPSILON, SCALE_MAX, SCALE_MIN};
use crate::coords::Point;

/// Destination corners TL, TR, BR, BL in preview px.
pub type Quad = [Point; 4];

/// Per-image alignment, expressed in preview-space coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentParams {
    pub tx: f64,
    pub ty: f64,
    /// Degrees, counter-clockwise on screen.
    pub theta: f64,
    pub scale: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quad: Option<Quad>,
}

impl Default for AlignmentParams {
    fn default() -> Self {
        Self {
            tx: 0.0,
            ty: 0.0,
            theta: 0.0,
            scale: 1.0,
            quad: None,
        }
    }
}

impl AlignmentParams {
    pub fn clamp_scale(&mut self) {
        self.scale = clamp_scale(self.scale);
    }

    /// True when a quad is present and differs from `default_quad`.
    pub fn uses_perspective(&self, default_quad: &Quad) -> bool {
        match &self.quad {
            Some(q) => !is_default_quad(q, default_quad),
            None => false,
        }
    }

    pub fn signature(&self, default_quad: &Quad) -> ParamsSignature {
        let quad = self.quad.as_ref().unwrap_or(default_quad);
        let mut bits = [0u64; 12];
        bits[0] = self.tx.to_bits();
        bits[1] = self.ty.to_bits();
        bits[2] = self.theta.to_bits();
        bits[3] = self.scale.to_bits();
        for (i, p) in quad.iter().enumerate() {
            bits[4 + 2 * i] = p.x.to_bits();
            bits[5 + 2 * i] = p.y.to_bits();
        }
        ParamsSignature(bits)
    }
}

/// Value-equality snapshot of an [`AlignmentParams`], used for staleness checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ParamsSignature([u64; 12]);

pub fn clamp_scale(scale: f64) -> f64 {
    if scale.is_finite() {
        scale.clamp(SCALE_MIN, SCALE_MAX)
    } else {
        1.0
    }
}

pub fn is_default_quad(quad: &Quad, default_quad: &Quad) -> bool {
    quad.iter()
        .zip(default_quad.iter())
        .all(|(a, b)| (a.x - b.x).abs() <= QUAD_EPSILON && (a.y - b.y).abs() <= QUAD_EPSILON)
}

/// Which edits an image accepts and how it renders.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditMode {
    /// Pure affine editing and rendering.
    #[default]
    Affine,
    /// Corner handles are live; move/rotate/scale are locked.
    PerspectiveEditing,
    /// A non-default quad is in effect but handles are hidden.
    PerspectiveApplied,
}

impl EditMode {
    pub fn allows_affine(&self) -> bool {
        !matches!(self, Self::PerspectiveEditing)
    }

    pub fn is_editing_perspective(&self) -> bool {
        matches!(self, Self::PerspectiveEditing)
    }

    /// Mode implied by the params when perspective editing is not active.
    pub fn settled(params: &AlignmentParams, default_quad: &Quad) -> Self {
        if params.uses_perspective(default_quad) {
            Self::PerspectiveApplied
        } else {
            Self::Affine
        }
    }
}

impl std::fmt::Display for EditMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Affine => write!(f, "Affine"),
            Self::PerspectiveEditing => write!(f, "Perspective (editing)"),
            Self::PerspectiveApplied => write!(f, "Perspective"),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ImageRecord {
    pub params: AlignmentParams,
    pub mode: EditMode,
}

/// Path → alignment record, exclusively owned by the editing session.
#[derive(Clone, Debug, Default)]
pub struct ParamStore {
    records: HashMap<PathBuf, ImageRecord>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh identity records for every path; previous records are dropped.
    pub fn reset_all<'a>(&mut self, paths: impl IntoIterator<Item = &'a PathBuf>) {
        self.records = paths
            .into_iter()
            .map(|p| (p.clone(), ImageRecord::default()))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record_mut(&mut self, path: &Path) -> &mut ImageRecord {
        self.records.entry(path.to_path_buf()).or_default()
    }

    /// Params for `path`, created with identity defaults if absent.
    pub fn get(&mut self, path: &Path) -> &AlignmentParams {
        &self.record_mut(path).params
    }

    pub fn peek(&self, path: &Path) -> Option<&AlignmentParams> {
        self.records.get(path).map(|r| &r.params)
    }

    /// Owned copy, identity if the path has never been touched.
    pub fn snapshot(&self, path: &Path) -> AlignmentParams {
        self.peek(path).cloned().unwrap_or_default()
    }

    pub fn mode(&self, path: &Path) -> EditMode {
        self.records.get(path).map(|r| r.mode).unwrap_or_default()
    }

    pub fn set_mode(&mut self, path: &Path, mode: EditMode) {
        self.record_mut(path).mode = mode;
    }

    /// Apply `mutator`, then re-establish the scale clamp.
    pub fn update(&mut self, path: &Path, mutator: impl FnOnce(&mut AlignmentParams)) {
        let params = &mut self.record_mut(path).params;
        mutator(params);
        params.clamp_scale();
    }

    /// Replace the params wholesale (history restore, project load).
    pub fn set(&mut self, path: &Path, mut params: AlignmentParams) {
        params.clamp_scale();
        self.record_mut(path).params = params;
    }

    /// Install `seed` when the image has no quad or only the default rectangle.
    pub fn ensure_perspective_quad(
        &mut self,
        path: &Path,
        seed: &Quad,
        default_quad: &Quad,
    ) -> Quad {
        let quad = &mut self.record_mut(path).params.quad;
        if let Some(q) = quad.filter(|q| !is_default_quad(q, default_quad)) {
            return q;
        }
        *quad.insert(*seed)
    }

    /// Identity affine, no quad, affine mode.
    pub fn reset_to_default(&mut self, path: &Path) {
        let record = self.record_mut(path);
        record.params = AlignmentParams::default();
        record.mode = EditMode::Affine;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &ImageRecord)> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad(w: f64, h: f64) -> Quad {
        [
            Point::new(0.0, 0.0),
            Point::new(w - 1.0, 0.0),
            Point::new(w - 1.0, h - 1.0),
            Point::new(0.0, h - 1.0),
        ]
    }

    #[test]
    fn test_scale_clamped_on_update() {
        let mut store = ParamStore::new();
        let p = PathBuf::from("a.png");
        store.update(&p, |params| params.scale = 3.0);
        assert_eq!(store.get(&p).scale, SCALE_MAX);
        store.update(&p, |params| params.scale = 0.1);
        assert_eq!(store.get(&p).scale, SCALE_MIN);
    }

    #[test]
    fn test_default_quad_within_epsilon_is_affine() {
        let d = quad(100.0, 80.0);
        let mut params = AlignmentParams::default();
        let mut q = d;
        q[2].x += 0.0005;
        params.quad = Some(q);
        assert!(!params.uses_perspective(&d));
        q[2].x += 0.5;
        params.quad = Some(q);
        assert!(params.uses_perspective(&d));
    }

    #[test]
    fn test_signature_missing_quad_equals_default_quad() {
        let d = quad(10.0, 10.0);
        let a = AlignmentParams::default();
        let b = AlignmentParams {
            quad: Some(d),
            ..Default::default()
        };
        assert_eq!(a.signature(&d), b.signature(&d));
        let c = AlignmentParams {
            tx: 1.0,
            ..Default::default()
        };
        assert_ne!(a.signature(&d), c.signature(&d));
    }

    #[test]
    fn test_ensure_quad_replaces_only_missing_or_default() {
        let mut store = ParamStore::new();
        let p = PathBuf::from("a.png");
        let d = quad(10.0, 10.0);
        let mut seed = d;
        seed[0] = Point::new(2.0, 3.0);

        assert_eq!(store.ensure_perspective_quad(&p, &seed, &d), seed);

        store.update(&p, |params| params.quad = Some(d));
        assert_eq!(store.ensure_perspective_quad(&p, &seed, &d), seed);

        let mut edited = seed;
        edited[2].x += 4.0;
        store.update(&p, |params| params.quad = Some(edited));
        assert_eq!(store.ensure_perspective_quad(&p, &seed, &d), edited);
    }

    #[test]
    fn test_reset_removes_quad_and_mode() {
        let mut store = ParamStore::new();
        let p = PathBuf::from("a.png");
        store.ensure_perspective_quad(&p, &quad(4.0, 4.0), &quad(4.0, 4.0));
        store.set_mode(&p, EditMode::PerspectiveEditing);
        store.reset_to_default(&p);
        assert_eq!(store.get(&p), &AlignmentParams::default());
        assert_eq!(store.mode(&p), EditMode::Affine);
    }
}
