use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::consts::{DEFAULT_HISTORY_CAPACITY, DEFAULT_PREVIEW_MAX_SIDE};
use crate::error::{AlignError, Result};
use crate::params::AlignmentParams;
use crate::render::RenderOptions;
use crate::similarity::SimilarityConfig;

/// Folder layout of a project. Relative paths resolve against the directory
/// holding the project file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectPaths {
    pub base_image: Option<PathBuf>,
    pub source_dir: PathBuf,
    pub align_dir: Option<PathBuf>,
    pub crop_dir: Option<PathBuf>,
}

impl Default for ProjectPaths {
    fn default() -> Self {
        Self {
            base_image: None,
            source_dir: PathBuf::from("source"),
            align_dir: Some(PathBuf::from("align_out")),
            crop_dir: Some(PathBuf::from("crop_out")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Longest preview side in px.
    pub max_side: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            max_side: DEFAULT_PREVIEW_MAX_SIDE,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditingConfig {
    pub history_capacity: usize,
    /// Preview px per move step.
    pub move_step: f64,
    /// Degrees per rotate step.
    pub rotate_step: f64,
    pub scale_step: f64,
    pub fine_scale_step: f64,
    /// Preview px per corner nudge.
    pub corner_step: f64,
    pub alpha: f32,
    pub overlay: bool,
    pub outline: bool,
    pub grid_step: Option<u32>,
}

impl Default for EditingConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            move_step: 1.0,
            rotate_step: 0.10,
            scale_step: 0.005,
            fine_scale_step: 0.001,
            corner_step: 1.0,
            alpha: 0.5,
            overlay: true,
            outline: true,
            grid_step: None,
        }
    }
}

impl EditingConfig {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            overlay: self.overlay,
            alpha: self.alpha,
            outline: self.outline,
            grid_step: self.grid_step,
        }
    }
}

/// Project file: folders, tuning and the saved per-image alignment.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub paths: ProjectPaths,
    pub preview: PreviewConfig,
    pub editing: EditingConfig,
    pub similarity: SimilarityConfig,
    /// Keyed by the image path relative to the source folder.
    pub params: BTreeMap<String, AlignmentParams>,
    #[serde(skip)]
    root: PathBuf,
}

impl ProjectConfig {
    pub fn from_toml_str(s: &str, root: &Path) -> Result<Self> {
        let mut config: ProjectConfig =
            toml::from_str(s).map_err(|e| AlignError::Config(e.to_string()))?;
        config.root = root.to_path_buf();
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| AlignError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let root = path.parent().unwrap_or_else(|| Path::new("."));
        let config = Self::from_toml_str(&contents, root)?;
        info!(path = %path.display(), images = config.params.len(), "Loaded project");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        info!(path = %path.display(), "Saved project");
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn set_root(&mut self, root: &Path) {
        self.root = root.to_path_buf();
    }

    pub fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    pub fn base_image(&self) -> Option<PathBuf> {
        self.paths.base_image.as_deref().map(|p| self.resolve(p))
    }

    pub fn source_dir(&self) -> PathBuf {
        self.resolve(&self.paths.source_dir)
    }

    pub fn align_dir(&self) -> Option<PathBuf> {
        self.paths.align_dir.as_deref().map(|p| self.resolve(p))
    }

    pub fn crop_dir(&self) -> Option<PathBuf> {
        self.paths.crop_dir.as_deref().map(|p| self.resolve(p))
    }

    /// Stable `params` key for an image: its path below the source folder,
    /// `/`-separated.
    pub fn params_key(&self, image: &Path) -> String {
        let source = self.source_dir();
        let rel = image.strip_prefix(&source).unwrap_or(image);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    pub fn params_for(&self, image: &Path) -> Option<&AlignmentParams> {
        self.params.get(&self.params_key(image))
    }
}
