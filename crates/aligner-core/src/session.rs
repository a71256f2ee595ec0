//! The interactive editing session.
//!
//! Owns the base image, the source list, the parameter store, history and
//! the preview cache. Every edit goes through [`EditingSession::apply`] on
//! the interactive thread; background scoring only ever sees snapshots
//! produced by [`EditingSession::scoring_job`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::consts::CORNER_PICK_RADIUS;
use crate::coords::{rect_corners, Point, ScaleContext, ViewTransform};
use crate::crop::{execute_crop, map_draw_rect_to_full, CropContext, CropItem, CropRequest, CropSummary};
use crate::error::{AlignError, Result};
use crate::history::History;
use crate::io::{
    downscale_to, list_source_images, load_rgb, png_name, save_png, unique_png_names,
};
use crate::params::{AlignmentParams, EditMode, ParamStore, Quad};
use crate::project::{EditingConfig, ProjectConfig};
use crate::render::{compose_preview, render_aligned_full, RenderOptions, RenderOutput};
use crate::similarity::{Debouncer, ScoreUpdate, ScoringJob, SimilarityScheduler};
use crate::warp::{affine_matrix, plan_warp, WarpPlan};

/// One user action against the current image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EditCommand {
    /// Shift by preview px.
    Translate { dx: f64, dy: f64 },
    /// Add degrees, counter-clockwise on screen.
    Rotate { degrees: f64 },
    /// Multiply the scale.
    Scale { factor: f64 },
    /// Move the active corner by preview px.
    NudgeCorner { dx: f64, dy: f64 },
    SelectCorner(usize),
    TogglePerspective,
    Undo,
    Redo,
    Reset,
    Next,
    Previous,
    /// Start of a drag: the edits up to `EndGesture` form one history step.
    BeginGesture,
    EndGesture,
}

struct Gesture {
    path: PathBuf,
    before: AlignmentParams,
}

struct BaseImage {
    path: Option<PathBuf>,
    full: Arc<RgbImage>,
    preview: Arc<RgbImage>,
    scale: ScaleContext,
}

pub struct EditingSession {
    config: EditingConfig,
    preview_max_side: u32,
    base: Option<BaseImage>,
    files: Vec<PathBuf>,
    output_names: HashMap<PathBuf, PathBuf>,
    current: usize,
    store: ParamStore,
    history: History,
    previews: HashMap<PathBuf, Arc<RgbImage>>,
    active_corner: usize,
    gesture: Option<Gesture>,
    align_out: Option<PathBuf>,
    crop_out: Option<PathBuf>,
}

impl EditingSession {
    pub fn new(config: EditingConfig, preview_max_side: u32) -> Self {
        let history = History::new(config.history_capacity);
        Self {
            config,
            preview_max_side,
            base: None,
            files: Vec::new(),
            output_names: HashMap::new(),
            current: 0,
            store: ParamStore::new(),
            history,
            previews: HashMap::new(),
            active_corner: 0,
            gesture: None,
            align_out: None,
            crop_out: None,
        }
    }

    /// Base, sources, output folders and saved params from a project file.
    pub fn from_project(project: &ProjectConfig) -> Result<Self> {
        let mut session = Self::new(project.editing.clone(), project.preview.max_side);
        session.set_output_dirs(project.align_dir(), project.crop_dir());

        let base = project.base_image().ok_or(AlignError::NoBaseImage)?;
        session.load_base(&base)?;

        let exclude: Vec<PathBuf> = [project.align_dir(), project.crop_dir()]
            .into_iter()
            .flatten()
            .collect();
        session.set_sources(list_source_images(&project.source_dir(), &exclude)?);

        let saved: Vec<(PathBuf, AlignmentParams)> = session
            .files
            .iter()
            .filter_map(|p| project.params_for(p).map(|params| (p.clone(), params.clone())))
            .collect();
        for (path, params) in saved {
            session.restore_params(&path, params);
        }
        Ok(session)
    }

    /// Copy every non-identity param set back into the project.
    pub fn write_params(&self, project: &mut ProjectConfig) {
        project.params.clear();
        for path in &self.files {
            if let Some(params) = self.store.peek(path) {
                if *params != AlignmentParams::default() {
                    project.params.insert(project.params_key(path), params.clone());
                }
            }
        }
    }

    pub fn set_output_dirs(&mut self, align_out: Option<PathBuf>, crop_out: Option<PathBuf>) {
        self.align_out = align_out;
        self.crop_out = crop_out;
    }

    pub fn load_base(&mut self, path: &Path) -> Result<()> {
        let img = load_rgb(path)?;
        self.set_base_image(img, Some(path.to_path_buf()))
    }

    /// Install a new base. Preview cache, params and history are rebuilt
    /// since every preview-space value depends on the base's scale.
    pub fn set_base_image(&mut self, full: RgbImage, path: Option<PathBuf>) -> Result<()> {
        let scale = ScaleContext::new(full.width(), full.height(), self.preview_max_side)?;
        let preview = downscale_to(&full, scale.preview_width, scale.preview_height);
        info!(
            width = scale.full_width,
            height = scale.full_height,
            preview_scale = scale.preview_scale,
            "Base image loaded"
        );
        self.base = Some(BaseImage {
            path,
            full: Arc::new(full),
            preview: Arc::new(preview),
            scale,
        });
        self.invalidate();
        Ok(())
    }

    pub fn set_sources(&mut self, files: Vec<PathBuf>) {
        info!(count = files.len(), "Source images set");
        let names = unique_png_names(files.iter().map(PathBuf::as_path), &[]);
        self.output_names = files.iter().cloned().zip(names).collect();
        self.files = files;
        self.invalidate();
    }

    /// File name `path` is exported under in the align folder.
    pub fn output_name(&self, path: &Path) -> PathBuf {
        self.output_names
            .get(path)
            .cloned()
            .unwrap_or_else(|| png_name(path))
    }

    fn invalidate(&mut self) {
        self.store.reset_all(&self.files);
        self.history.clear();
        self.previews.clear();
        self.current = 0;
        self.active_corner = 0;
        self.gesture = None;
    }

    /// Decode-free preview registration, for images already in memory.
    pub fn insert_image(&mut self, path: &Path, full: &RgbImage) -> Result<Arc<RgbImage>> {
        let scale = self.scale()?;
        let (pw, ph) = scale.preview_size_of(full.width(), full.height());
        let preview = Arc::new(downscale_to(full, pw, ph));
        self.previews.insert(path.to_path_buf(), Arc::clone(&preview));
        Ok(preview)
    }

    fn ensure_known(&self, path: &Path) -> Result<()> {
        if self.files.iter().any(|p| p == path) {
            Ok(())
        } else {
            Err(AlignError::UnknownImage(path.to_path_buf()))
        }
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.files.get(self.current).map(|p| p.as_path())
    }

    pub fn set_current(&mut self, index: usize) {
        if index < self.files.len() && index != self.current {
            self.finish_gesture();
            self.current = index;
            debug!(index, "Current image changed");
        }
    }

    pub fn scale(&self) -> Result<ScaleContext> {
        self.base.as_ref().map(|b| b.scale).ok_or(AlignError::NoBaseImage)
    }

    pub fn base_preview(&self) -> Option<Arc<RgbImage>> {
        self.base.as_ref().map(|b| Arc::clone(&b.preview))
    }

    pub fn base_path(&self) -> Option<&Path> {
        self.base.as_ref().and_then(|b| b.path.as_deref())
    }

    pub fn default_quad(&self) -> Result<Quad> {
        Ok(self.scale()?.default_quad())
    }

    pub fn params(&self, path: &Path) -> AlignmentParams {
        self.store.snapshot(path)
    }

    pub fn mode(&self, path: &Path) -> EditMode {
        self.store.mode(path)
    }

    pub fn current_mode(&self) -> EditMode {
        self.current_path()
            .map(|p| self.store.mode(p))
            .unwrap_or_default()
    }

    pub fn active_corner(&self) -> usize {
        self.active_corner
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn config(&self) -> &EditingConfig {
        &self.config
    }

    /// Params loaded from elsewhere (project file); not recorded in history.
    pub fn restore_params(&mut self, path: &Path, params: AlignmentParams) {
        let mode = match self.default_quad() {
            Ok(dq) => EditMode::settled(&params, &dq),
            Err(_) => EditMode::Affine,
        };
        self.store.set(path, params);
        self.store.set_mode(path, mode);
    }

    /// Cached preview of a moving image, decoded on first use.
    pub fn moving_preview(&mut self, path: &Path) -> Result<Arc<RgbImage>> {
        if let Some(p) = self.previews.get(path) {
            return Ok(Arc::clone(p));
        }
        let full = load_rgb(path)?;
        self.insert_image(path, &full)
    }

    /// Apply one command to the current image. Returns whether anything changed.
    pub fn apply(&mut self, command: EditCommand) -> Result<bool> {
        match command {
            EditCommand::Next => {
                let next = (self.current + 1).min(self.files.len().saturating_sub(1));
                let changed = next != self.current;
                self.set_current(next);
                return Ok(changed);
            }
            EditCommand::Previous => {
                let prev = self.current.saturating_sub(1);
                let changed = prev != self.current;
                self.set_current(prev);
                return Ok(changed);
            }
            _ => {}
        }

        let Some(path) = self.current_path().map(Path::to_path_buf) else {
            return Ok(false);
        };
        let mode = self.store.mode(&path);

        match command {
            EditCommand::Translate { dx, dy } => self.edit_affine(&path, mode, |p| {
                p.tx += dx;
                p.ty += dy;
            }),
            EditCommand::Rotate { degrees } => {
                self.edit_affine(&path, mode, |p| p.theta += degrees)
            }
            EditCommand::Scale { factor } => self.edit_affine(&path, mode, |p| p.scale *= factor),
            EditCommand::NudgeCorner { dx, dy } => self.nudge_corner(&path, mode, dx, dy),
            EditCommand::SelectCorner(i) => {
                if !mode.is_editing_perspective() {
                    return Ok(false);
                }
                let i = i.min(3);
                let changed = i != self.active_corner;
                self.active_corner = i;
                Ok(changed)
            }
            EditCommand::TogglePerspective => self.toggle_perspective(&path, mode),
            EditCommand::Undo => {
                self.finish_gesture();
                let restored = self.history.undo(&path);
                Ok(self.restore_from_history(&path, restored))
            }
            EditCommand::Redo => {
                self.finish_gesture();
                let restored = self.history.redo(&path);
                Ok(self.restore_from_history(&path, restored))
            }
            EditCommand::Reset => {
                self.finish_gesture();
                let before = self.store.snapshot(&path);
                self.store.reset_to_default(&path);
                let after = self.store.snapshot(&path);
                let changed = before != after || mode != EditMode::Affine;
                self.history.push(&path, &before, after);
                Ok(changed)
            }
            EditCommand::BeginGesture => {
                self.finish_gesture();
                self.gesture = Some(Gesture {
                    before: self.store.snapshot(&path),
                    path,
                });
                Ok(false)
            }
            EditCommand::EndGesture => Ok(self.finish_gesture()),
            EditCommand::Next | EditCommand::Previous => Ok(false),
        }
    }

    fn edit_affine(
        &mut self,
        path: &Path,
        mode: EditMode,
        mutate: impl FnOnce(&mut AlignmentParams),
    ) -> Result<bool> {
        if !mode.allows_affine() {
            debug!(mode = %mode, "Affine edit ignored while editing perspective");
            return Ok(false);
        }
        let before = self.store.snapshot(path);
        self.store.update(path, mutate);
        if mode == EditMode::PerspectiveApplied {
            self.carry_quad(path, &before)?;
        }
        Ok(self.record(path, before))
    }

    /// Move an applied quad by the same affine step as the pose, so the
    /// edit shows on top of the perspective correction.
    fn carry_quad(&mut self, path: &Path, before: &AlignmentParams) -> Result<()> {
        let Some(quad) = before.quad else {
            return Ok(());
        };
        let (mw, mh) = self.moving_preview(path)?.dimensions();
        let after = self.store.snapshot(path);
        let Some(undo_old) = affine_matrix(before, mw, mh).inverse() else {
            return Ok(());
        };
        let step = affine_matrix(&after, mw, mh).compose(&undo_old);
        self.store.update(path, |p| p.quad = Some(step.apply_quad(&quad)));
        Ok(())
    }

    /// Corners of the moving preview under its current affine pose.
    fn pose_quad(&mut self, path: &Path) -> Result<Quad> {
        let (mw, mh) = self.moving_preview(path)?.dimensions();
        let params = self.store.snapshot(path);
        Ok(affine_matrix(&params, mw, mh).apply_quad(&rect_corners(mw, mh)))
    }

    fn nudge_corner(&mut self, path: &Path, mode: EditMode, dx: f64, dy: f64) -> Result<bool> {
        if !mode.is_editing_perspective() {
            return Ok(false);
        }
        let dq = self.default_quad()?;
        let before = self.store.snapshot(path);
        let seed = self.pose_quad(path)?;
        self.store.ensure_perspective_quad(path, &seed, &dq);
        let corner = self.active_corner;
        self.store.update(path, |p| {
            if let Some(q) = p.quad.as_mut() {
                q[corner].x += dx;
                q[corner].y += dy;
            }
        });
        let changed = self.record(path, before);
        self.check_geometry(path)?;
        Ok(changed)
    }

    fn toggle_perspective(&mut self, path: &Path, mode: EditMode) -> Result<bool> {
        self.finish_gesture();
        let dq = self.default_quad()?;
        if mode.is_editing_perspective() {
            let params = self.store.snapshot(path);
            self.store.set_mode(path, EditMode::settled(&params, &dq));
            return Ok(true);
        }

        let seed = self.pose_quad(path)?;
        self.store.ensure_perspective_quad(path, &seed, &dq);
        self.store.set_mode(path, EditMode::PerspectiveEditing);
        self.active_corner = self.active_corner.min(3);
        Ok(true)
    }

    /// Push `before → current` unless a gesture is collecting edits.
    fn record(&mut self, path: &Path, before: AlignmentParams) -> bool {
        let after = self.store.snapshot(path);
        let changed = after != before;
        let in_gesture = self.gesture.as_ref().is_some_and(|g| g.path == path);
        if changed && !in_gesture {
            self.history.push(path, &before, after);
        }
        changed
    }

    fn finish_gesture(&mut self) -> bool {
        let Some(g) = self.gesture.take() else {
            return false;
        };
        let after = self.store.snapshot(&g.path);
        if after == g.before {
            return false;
        }
        self.history.push(&g.path, &g.before, after);
        true
    }

    fn restore_from_history(&mut self, path: &Path, restored: Option<AlignmentParams>) -> bool {
        let Some(params) = restored else {
            return false;
        };
        self.store.set(path, params);
        if !self.store.mode(path).is_editing_perspective() {
            if let Ok(dq) = self.default_quad() {
                let settled = EditMode::settled(&self.store.snapshot(path), &dq);
                self.store.set_mode(path, settled);
            }
        }
        true
    }

    /// Leave perspective editing if the current quad cannot be solved.
    fn check_geometry(&mut self, path: &Path) -> Result<()> {
        let plan = self.plan_for(path)?;
        if let Some(e) = plan.geometry_error {
            if self.store.mode(path).is_editing_perspective() {
                warn!(path = %path.display(), error = %e, "Leaving perspective editing");
                let dq = self.default_quad()?;
                let settled = EditMode::settled(&self.store.snapshot(path), &dq);
                self.store.set_mode(path, settled);
            }
        }
        Ok(())
    }

    pub fn plan_for(&mut self, path: &Path) -> Result<WarpPlan> {
        let dq = self.default_quad()?;
        let moving = self.moving_preview(path)?;
        let params = self.store.snapshot(path);
        Ok(plan_warp(&params, moving.width(), moving.height(), &dq))
    }

    /// Compose the current image over the base preview.
    pub fn render_current(&mut self, options: &RenderOptions) -> Result<RenderOutput> {
        let path = self
            .current_path()
            .map(Path::to_path_buf)
            .ok_or(AlignError::NoBaseImage)?;
        self.render(&path, options)
    }

    pub fn render(&mut self, path: &Path, options: &RenderOptions) -> Result<RenderOutput> {
        let base = self.base_preview().ok_or(AlignError::NoBaseImage)?;
        let moving = self.moving_preview(path)?;
        self.check_geometry(path)?;
        let plan = self.plan_for(path)?;
        let handles = self
            .store
            .mode(path)
            .is_editing_perspective()
            .then_some(self.active_corner);
        Ok(compose_preview(&base, &moving, &plan, handles, options))
    }

    /// Select the quad corner nearest to a draw-space point, if within reach.
    pub fn pick_corner(&mut self, draw: Point, view: &ViewTransform) -> Result<Option<usize>> {
        let Some(path) = self.current_path().map(Path::to_path_buf) else {
            return Ok(None);
        };
        if !self.store.mode(&path).is_editing_perspective() {
            return Ok(None);
        }
        let plan = self.plan_for(&path)?;
        let radius_sq = CORNER_PICK_RADIUS * CORNER_PICK_RADIUS;
        let nearest = plan
            .outline
            .iter()
            .map(|c| view.preview_to_draw(*c).distance_sq(&draw))
            .enumerate()
            .filter(|(_, d)| *d <= radius_sq)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i);
        if let Some(i) = nearest {
            self.active_corner = i;
        }
        Ok(nearest)
    }

    /// Write the full-resolution aligned current image to the align folder.
    pub fn save_current_aligned(&mut self) -> Result<PathBuf> {
        let path = self
            .current_path()
            .map(Path::to_path_buf)
            .ok_or(AlignError::NoBaseImage)?;
        self.save_aligned(&path)
    }

    pub fn save_aligned(&mut self, path: &Path) -> Result<PathBuf> {
        self.ensure_known(path)?;
        let out_dir = self.align_out.clone().ok_or(AlignError::MissingOutputDir("align"))?;
        let scale = self.scale()?;
        let full = load_rgb(path)?;
        if !self.previews.contains_key(path) {
            self.insert_image(path, &full)?;
        }
        let params = self.store.snapshot(path);
        let (warped, plan) = render_aligned_full(&full, &params, &scale);
        if let Some(e) = plan.geometry_error {
            warn!(path = %path.display(), error = %e, "Exported with affine fallback");
        }

        let out = out_dir.join(self.output_name(path));
        save_png(&warped.image, &out)?;
        info!(path = %out.display(), "Saved aligned image");
        Ok(out)
    }

    /// Export every source image; unreadable ones are logged and skipped.
    pub fn save_all_aligned(
        &mut self,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<Vec<PathBuf>> {
        if self.align_out.is_none() {
            return Err(AlignError::MissingOutputDir("align"));
        }
        let files = self.files.clone();
        let total = files.len();
        let mut written = Vec::with_capacity(total);
        for (i, path) in files.iter().enumerate() {
            match self.save_aligned(path) {
                Ok(out) => written.push(out),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping export"),
            }
            progress(i + 1, total);
        }
        Ok(written)
    }

    /// Crop the base and every moving image to a region drawn on screen.
    pub fn crop(
        &mut self,
        request: &CropRequest,
        progress: impl FnMut(usize, usize),
    ) -> Result<CropSummary> {
        let crop_out = self.crop_out.clone().ok_or(AlignError::MissingOutputDir("crop"))?;
        self.finish_gesture();
        let base = self.base.as_ref().ok_or(AlignError::NoBaseImage)?;
        let rect = map_draw_rect_to_full(&request.rect, &request.view, &base.scale);
        info!(
            x = rect.x,
            y = rect.y,
            width = rect.width,
            height = rect.height,
            crop_target = %request.target,
            "Cropping"
        );

        let items: Vec<CropItem> = self
            .files
            .iter()
            .map(|p| CropItem {
                path: p.clone(),
                params: self.store.snapshot(p),
            })
            .collect();
        let ctx = CropContext {
            base_path: base.path.as_deref(),
            base_full: &base.full,
            scale: &base.scale,
            align_out: self.align_out.as_deref(),
            crop_out: &crop_out,
        };
        execute_crop(rect, request.target, &ctx, &items, progress)
    }

    /// Snapshot of everything a worker needs to score `path`.
    pub fn scoring_job(&mut self, path: &Path) -> Result<ScoringJob> {
        self.ensure_known(path)?;
        let base = self.base_preview().ok_or(AlignError::NoBaseImage)?;
        let default_quad = self.default_quad()?;
        let moving = self.moving_preview(path)?;
        Ok(ScoringJob {
            path: path.to_path_buf(),
            base,
            moving,
            params: self.store.snapshot(path),
            default_quad,
        })
    }

    /// One tick of live scoring for the displayed image.
    ///
    /// Submits a snapshot job when the debouncer sees new params, then drains
    /// finished updates and returns the newest one computed from the current
    /// params. Updates for other images or older params are dropped here;
    /// the scheduler cache still holds them.
    pub fn poll_scoring(
        &mut self,
        debouncer: &mut Debouncer,
        scheduler: &SimilarityScheduler,
        now: Instant,
    ) -> Result<Option<ScoreUpdate>> {
        let Some(path) = self.current_path().map(Path::to_path_buf) else {
            return Ok(None);
        };
        let signature = self.store.snapshot(&path).signature(&self.default_quad()?);
        if debouncer.poll(now, &path, signature) {
            scheduler.submit(self.scoring_job(&path)?);
            debug!(path = %path.display(), "Scoring submitted");
        }
        Ok(scheduler
            .drain()
            .into_iter()
            .filter(|u| u.path == path && u.signature == signature)
            .last())
    }

    /// Jobs for every source image; images that fail to load are skipped.
    pub fn scoring_jobs(&mut self) -> Vec<ScoringJob> {
        let files = self.files.clone();
        files
            .iter()
            .filter_map(|p| match self.scoring_job(p) {
                Ok(job) => Some(job),
                Err(e) => {
                    warn!(path = %p.display(), error = %e, "Cannot score image");
                    None
                }
            })
            .collect()
    }
}
