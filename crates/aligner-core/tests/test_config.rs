use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use tempfile::TempDir;

use aligner_core::coords::Point;
use aligner_core::crop::CropTarget;
use aligner_core::error::AlignError;
use aligner_core::params::{AlignmentParams, EditMode};
use aligner_core::project::ProjectConfig;
use aligner_core::similarity::SimilarityConfig;

// ---------------------------------------------------------------------------
// Display / parse
// ---------------------------------------------------------------------------

#[test]
fn test_edit_mode_display() {
    assert_eq!(format!("{}", EditMode::Affine), "Affine");
    assert_eq!(
        format!("{}", EditMode::PerspectiveEditing),
        "Perspective (editing)"
    );
    assert_eq!(format!("{}", EditMode::PerspectiveApplied), "Perspective");
}

#[test]
fn test_edit_mode_default_is_affine() {
    assert_eq!(EditMode::default(), EditMode::Affine);
}

#[test]
fn test_crop_target_display_round_trips() {
    for t in [CropTarget::Aligned, CropTarget::Source] {
        assert_eq!(t.to_string().parse::<CropTarget>(), Ok(t));
    }
}

// ---------------------------------------------------------------------------
// Project file
// ---------------------------------------------------------------------------

#[test]
fn test_defaults() {
    let c = ProjectConfig::default();
    assert_eq!(c.preview.max_side, 1600);
    assert_eq!(c.paths.source_dir, PathBuf::from("source"));
    assert_eq!(c.paths.align_dir, Some(PathBuf::from("align_out")));
    assert_eq!(c.similarity.hist_bins, [30, 32, 32]);
    assert_eq!(c.similarity.max_keypoints, 500);
    assert_eq!(c.similarity.pyramid_levels, 8);
    assert_relative_eq!(c.similarity.pyramid_scale, 1.2);
    assert_eq!(c.similarity.debounce_ms, 180);
    assert_relative_eq!(c.similarity.weights.ssim, 0.45);
    assert!(c.params.is_empty());
}

#[test]
fn test_empty_file_gives_defaults() {
    let c = ProjectConfig::from_toml_str("", Path::new("/work")).unwrap();
    let mut expected = ProjectConfig::default();
    expected.set_root(Path::new("/work"));
    assert_eq!(c, expected);
}

#[test]
fn test_partial_sections_keep_other_defaults() {
    let c = ProjectConfig::from_toml_str(
        r#"
[editing]
move_step = 5.0

[similarity.weights]
orb = 0.3
"#,
        Path::new("."),
    )
    .unwrap();
    assert_relative_eq!(c.editing.move_step, 5.0);
    assert_relative_eq!(c.editing.rotate_step, 0.10);
    assert_relative_eq!(c.similarity.weights.orb, 0.3);
    assert_relative_eq!(c.similarity.weights.ssim, 0.45);
    assert_eq!(c.similarity, SimilarityConfig {
        weights: c.similarity.weights,
        ..Default::default()
    });
}

#[test]
fn test_toml_round_trip_with_params() {
    let mut c = ProjectConfig::default();
    c.paths.base_image = Some(PathBuf::from("ref/base.tif"));
    c.editing.grid_step = Some(32);
    c.params.insert(
        "night/a.jpg".into(),
        AlignmentParams {
            tx: 1.5,
            ty: -2.25,
            theta: 0.3,
            scale: 1.01,
            quad: None,
        },
    );
    c.params.insert(
        "b.png".into(),
        AlignmentParams {
            quad: Some([
                Point::new(1.0, 2.0),
                Point::new(98.0, 0.5),
                Point::new(99.0, 74.0),
                Point::new(0.0, 73.0),
            ]),
            ..Default::default()
        },
    );

    let s = c.to_toml_string().unwrap();
    let back = ProjectConfig::from_toml_str(&s, Path::new("")).unwrap();
    assert_eq!(back, c);
}

#[test]
fn test_invalid_toml_is_config_error() {
    let err = ProjectConfig::from_toml_str("[paths\nbase_image = 1", Path::new(".")).unwrap_err();
    assert!(matches!(err, AlignError::Config(_)));
}

#[test]
fn test_paths_resolve_against_project_dir() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("project.toml");
    std::fs::write(
        &file,
        "[paths]\nbase_image = \"base.png\"\nsource_dir = \"shots\"\ncrop_dir = \"/abs/crops\"\n",
    )
    .unwrap();

    let c = ProjectConfig::load(&file).unwrap();
    assert_eq!(c.root(), dir.path());
    assert_eq!(c.base_image(), Some(dir.path().join("base.png")));
    assert_eq!(c.source_dir(), dir.path().join("shots"));
    assert_eq!(c.align_dir(), Some(dir.path().join("align_out")));
    assert_eq!(c.crop_dir(), Some(PathBuf::from("/abs/crops")));
    assert_eq!(
        c.params_key(&dir.path().join("shots").join("sub").join("x.jpg")),
        "sub/x.jpg"
    );
}

#[test]
fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("p.toml");
    let mut c = ProjectConfig::default();
    c.set_root(dir.path());
    c.params.insert(
        "a.png".into(),
        AlignmentParams {
            tx: 4.0,
            ..Default::default()
        },
    );
    c.save(&file).unwrap();
    assert_eq!(ProjectConfig::load(&file).unwrap(), c);
}
