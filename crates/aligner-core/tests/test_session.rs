mod common;

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use aligner_core::consts::{SCALE_MAX, SCALE_MIN};
use aligner_core::coords::{rect_corners, Point, ViewTransform};
use aligner_core::error::AlignError;
use aligner_core::io::{list_source_images, load_rgb};
use aligner_core::params::{AlignmentParams, EditMode};
use aligner_core::project::{EditingConfig, ProjectConfig};
use aligner_core::session::{EditCommand, EditingSession};
use aligner_core::similarity::{Debouncer, ScoreUpdate, SimilarityConfig, SimilarityScheduler};

use common::{textured_rgb, write_png};

/// 200×150 base and `n` moving images; previews are 100×75.
fn setup(n: usize, history_capacity: usize) -> (TempDir, EditingSession) {
    let dir = TempDir::new().unwrap();
    let base = write_png(dir.path(), "base.png", &textured_rgb(200, 150, 0));
    for i in 0..n {
        write_png(
            dir.path(),
            &format!("source/img_{i}.png"),
            &textured_rgb(200, 150, i as u32 + 1),
        );
    }

    let config = EditingConfig {
        history_capacity,
        ..Default::default()
    };
    let mut session = EditingSession::new(config, 100);
    session.load_base(&base).unwrap();
    session.set_sources(list_source_images(&dir.path().join("source"), &[]).unwrap());
    (dir, session)
}

fn current(session: &EditingSession) -> (PathBuf, AlignmentParams) {
    let path = session.current_path().unwrap().to_path_buf();
    let params = session.params(&path);
    (path, params)
}

fn random_affine_edit(rng: &mut StdRng) -> EditCommand {
    match rng.random_range(0..3) {
        0 => EditCommand::Translate {
            dx: rng.random_range(-5.0..5.0),
            dy: rng.random_range(-5.0..5.0),
        },
        1 => EditCommand::Rotate {
            degrees: rng.random_range(-2.0..2.0),
        },
        _ => EditCommand::Scale {
            factor: rng.random_range(0.97..1.03),
        },
    }
}

// ---------------------------------------------------------------------------
// Affine edits and history
// ---------------------------------------------------------------------------

#[test]
fn test_session_starts_at_identity() {
    let (_dir, session) = setup(2, 50);
    assert_eq!(session.files().len(), 2);
    let (path, params) = current(&session);
    assert_eq!(params, AlignmentParams::default());
    assert_eq!(session.mode(&path), EditMode::Affine);
    assert_eq!(session.scale().unwrap().preview_size(), (100, 75));
}

#[test]
fn test_undo_redo_replays_random_edit_sequences() {
    for seed in [1u64, 2, 3, 42] {
        let (_dir, mut session) = setup(1, 200);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut states = vec![current(&session).1];
        for _ in 0..40 {
            if session.apply(random_affine_edit(&mut rng)).unwrap() {
                states.push(current(&session).1);
            }
        }
        assert!(states.len() > 1);

        for expected in states.iter().rev().skip(1) {
            assert!(session.apply(EditCommand::Undo).unwrap());
            assert_eq!(&current(&session).1, expected);
        }
        assert!(!session.apply(EditCommand::Undo).unwrap());

        for expected in states.iter().skip(1) {
            assert!(session.apply(EditCommand::Redo).unwrap());
            assert_eq!(&current(&session).1, expected);
        }
        assert!(!session.apply(EditCommand::Redo).unwrap());
    }
}

#[test]
fn test_history_is_bounded_by_capacity() {
    let (_dir, mut session) = setup(1, 5);
    for _ in 0..20 {
        session
            .apply(EditCommand::Translate { dx: 1.0, dy: 0.0 })
            .unwrap();
    }
    let (path, params) = current(&session);
    assert_relative_eq!(params.tx, 20.0);
    assert_eq!(session.history().len(&path), 5);

    for _ in 0..4 {
        assert!(session.apply(EditCommand::Undo).unwrap());
    }
    assert!(!session.apply(EditCommand::Undo).unwrap());
    assert_relative_eq!(current(&session).1.tx, 16.0);
}

#[test]
fn test_scale_stays_clamped() {
    let (_dir, mut session) = setup(1, 50);
    for _ in 0..50 {
        session.apply(EditCommand::Scale { factor: 1.1 }).unwrap();
    }
    assert_relative_eq!(current(&session).1.scale, SCALE_MAX);
    for _ in 0..50 {
        session.apply(EditCommand::Scale { factor: 0.9 }).unwrap();
    }
    assert_relative_eq!(current(&session).1.scale, SCALE_MIN);
}

#[test]
fn test_reset_restores_identity_and_is_undoable() {
    let (_dir, mut session) = setup(1, 50);
    session
        .apply(EditCommand::Translate { dx: 4.0, dy: 2.0 })
        .unwrap();
    session.apply(EditCommand::Rotate { degrees: 1.5 }).unwrap();
    let edited = current(&session).1;

    assert!(session.apply(EditCommand::Reset).unwrap());
    assert_eq!(current(&session).1, AlignmentParams::default());
    assert_eq!(session.current_mode(), EditMode::Affine);

    assert!(session.apply(EditCommand::Undo).unwrap());
    assert_eq!(current(&session).1, edited);
}

#[test]
fn test_gesture_collapses_into_one_history_step() {
    let (_dir, mut session) = setup(1, 50);
    session.apply(EditCommand::BeginGesture).unwrap();
    for _ in 0..6 {
        session
            .apply(EditCommand::Translate { dx: 0.5, dy: 0.25 })
            .unwrap();
    }
    assert!(session.apply(EditCommand::EndGesture).unwrap());

    let (path, params) = current(&session);
    assert_relative_eq!(params.tx, 3.0);
    assert_eq!(session.history().len(&path), 2);

    session.apply(EditCommand::Undo).unwrap();
    assert_eq!(current(&session).1, AlignmentParams::default());
}

#[test]
fn test_navigation_clamps_at_ends() {
    let (_dir, mut session) = setup(3, 50);
    assert!(!session.apply(EditCommand::Previous).unwrap());
    assert!(session.apply(EditCommand::Next).unwrap());
    assert!(session.apply(EditCommand::Next).unwrap());
    assert!(!session.apply(EditCommand::Next).unwrap());
    assert_eq!(session.current_index(), 2);
}

#[test]
fn test_params_are_per_image() {
    let (_dir, mut session) = setup(2, 50);
    session
        .apply(EditCommand::Translate { dx: 7.0, dy: 0.0 })
        .unwrap();
    session.apply(EditCommand::Next).unwrap();
    assert_eq!(current(&session).1, AlignmentParams::default());
    session.apply(EditCommand::Previous).unwrap();
    assert_relative_eq!(current(&session).1.tx, 7.0);
}

// ---------------------------------------------------------------------------
// Perspective editing
// ---------------------------------------------------------------------------

#[test]
fn test_perspective_toggle_seeds_quad_from_affine_pose() {
    let (_dir, mut session) = setup(1, 50);
    session
        .apply(EditCommand::Translate { dx: 5.0, dy: -3.0 })
        .unwrap();
    session.apply(EditCommand::TogglePerspective).unwrap();
    assert_eq!(session.current_mode(), EditMode::PerspectiveEditing);

    let quad = current(&session).1.quad.unwrap();
    for (q, c) in quad.iter().zip(rect_corners(100, 75).iter()) {
        assert_relative_eq!(q.x, c.x + 5.0, epsilon = 1e-9);
        assert_relative_eq!(q.y, c.y - 3.0, epsilon = 1e-9);
    }
}

#[test]
fn test_affine_edits_blocked_while_editing_perspective() {
    let (_dir, mut session) = setup(1, 50);
    session.apply(EditCommand::TogglePerspective).unwrap();
    let before = current(&session).1;
    assert!(!session
        .apply(EditCommand::Translate { dx: 3.0, dy: 3.0 })
        .unwrap());
    assert!(!session.apply(EditCommand::Rotate { degrees: 1.0 }).unwrap());
    assert!(!session.apply(EditCommand::Scale { factor: 1.1 }).unwrap());
    assert_eq!(current(&session).1, before);
}

#[test]
fn test_nudge_moves_active_corner_and_settles_applied() {
    let (_dir, mut session) = setup(1, 50);
    // Nudges outside perspective editing are ignored.
    assert!(!session
        .apply(EditCommand::NudgeCorner { dx: 1.0, dy: 1.0 })
        .unwrap());

    session.apply(EditCommand::TogglePerspective).unwrap();
    session.apply(EditCommand::SelectCorner(2)).unwrap();
    assert!(session
        .apply(EditCommand::NudgeCorner { dx: -4.0, dy: -2.0 })
        .unwrap());

    let quad = current(&session).1.quad.unwrap();
    assert_relative_eq!(quad[2].x, 95.0, epsilon = 1e-9);
    assert_relative_eq!(quad[2].y, 72.0, epsilon = 1e-9);
    assert_eq!(quad[0], Point::new(0.0, 0.0));

    session.apply(EditCommand::TogglePerspective).unwrap();
    assert_eq!(session.current_mode(), EditMode::PerspectiveApplied);

    session.apply(EditCommand::Undo).unwrap();
    assert_eq!(session.current_mode(), EditMode::Affine);
    assert_eq!(current(&session).1.quad, Some(rect_corners(100, 75)));
}

#[test]
fn test_nudge_after_undoing_seed_keeps_affine_pose() {
    let (_dir, mut session) = setup(1, 50);
    session
        .apply(EditCommand::Translate { dx: 20.0, dy: 10.0 })
        .unwrap();
    session.apply(EditCommand::TogglePerspective).unwrap();
    session
        .apply(EditCommand::NudgeCorner { dx: 1.0, dy: 0.0 })
        .unwrap();
    session.apply(EditCommand::Undo).unwrap();
    session.apply(EditCommand::Undo).unwrap();

    let params = current(&session).1;
    assert_relative_eq!(params.tx, 20.0);
    assert_eq!(params.quad, None);
    assert_eq!(session.current_mode(), EditMode::PerspectiveEditing);

    assert!(session
        .apply(EditCommand::NudgeCorner { dx: 1.0, dy: 0.0 })
        .unwrap());
    let quad = current(&session).1.quad.unwrap();
    assert_relative_eq!(quad[0].x, 21.0, epsilon = 1e-9);
    assert_relative_eq!(quad[0].y, 10.0, epsilon = 1e-9);
    assert_relative_eq!(quad[2].x, 119.0, epsilon = 1e-9);
    assert_relative_eq!(quad[2].y, 84.0, epsilon = 1e-9);

    let path = session.current_path().unwrap().to_path_buf();
    let plan = session.plan_for(&path).unwrap();
    assert_relative_eq!(plan.outline[0].x, 21.0, epsilon = 1e-6);
    assert_relative_eq!(plan.outline[0].y, 10.0, epsilon = 1e-6);
}

#[test]
fn test_affine_edit_moves_applied_perspective() {
    let (_dir, mut session) = setup(1, 50);
    session.apply(EditCommand::TogglePerspective).unwrap();
    session.apply(EditCommand::SelectCorner(2)).unwrap();
    session
        .apply(EditCommand::NudgeCorner { dx: 3.0, dy: 2.0 })
        .unwrap();
    session.apply(EditCommand::TogglePerspective).unwrap();
    assert_eq!(session.current_mode(), EditMode::PerspectiveApplied);

    let path = session.current_path().unwrap().to_path_buf();
    let options = session.config().render_options();
    let quad_before = current(&session).1.quad.unwrap();
    let render_before = session.render_current(&options).unwrap();

    assert!(session
        .apply(EditCommand::Translate { dx: 25.0, dy: 0.0 })
        .unwrap());
    let quad_after = current(&session).1.quad.unwrap();
    for (a, b) in quad_after.iter().zip(quad_before.iter()) {
        assert_relative_eq!(a.x, b.x + 25.0, epsilon = 1e-9);
        assert_relative_eq!(a.y, b.y, epsilon = 1e-9);
    }
    assert_eq!(session.mode(&path), EditMode::PerspectiveApplied);

    let plan = session.plan_for(&path).unwrap();
    assert!(plan.transform.is_perspective());
    assert_relative_eq!(plan.outline[2].x, quad_before[2].x + 25.0, epsilon = 1e-6);
    let render_after = session.render_current(&options).unwrap();
    assert_ne!(render_after.image, render_before.image);

    // Rotation turns the quad about the image centre.
    session.apply(EditCommand::Rotate { degrees: 90.0 }).unwrap();
    let rotated = current(&session).1.quad.unwrap();
    let (cx, cy) = (50.0 + 25.0, 37.5);
    for (r, a) in rotated.iter().zip(quad_after.iter()) {
        assert_relative_eq!(r.x - cx, a.y - cy, epsilon = 1e-9);
        assert_relative_eq!(r.y - cy, -(a.x - cx), epsilon = 1e-9);
    }

    session.apply(EditCommand::Undo).unwrap();
    session.apply(EditCommand::Undo).unwrap();
    assert_eq!(current(&session).1.quad, Some(quad_before));
}

#[test]
fn test_untouched_quad_settles_back_to_affine() {
    let (_dir, mut session) = setup(1, 50);
    session.apply(EditCommand::TogglePerspective).unwrap();
    session.apply(EditCommand::TogglePerspective).unwrap();
    assert_eq!(session.current_mode(), EditMode::Affine);
}

#[test]
fn test_degenerate_quad_leaves_editing() {
    let (_dir, mut session) = setup(1, 50);
    session.apply(EditCommand::TogglePerspective).unwrap();
    session.apply(EditCommand::SelectCorner(0)).unwrap();
    session
        .apply(EditCommand::NudgeCorner { dx: 150.0, dy: 0.0 })
        .unwrap();
    assert!(!session.current_mode().is_editing_perspective());

    let path = session.current_path().unwrap().to_path_buf();
    let plan = session.plan_for(&path).unwrap();
    assert!(plan.geometry_error.is_some());
    assert_eq!(plan.outline, rect_corners(100, 75));
}

#[test]
fn test_pick_corner_within_radius() {
    let (_dir, mut session) = setup(1, 50);
    let view = ViewTransform::default();
    assert_eq!(
        session.pick_corner(Point::new(97.0, 72.0), &view).unwrap(),
        None
    );

    session.apply(EditCommand::TogglePerspective).unwrap();
    assert_eq!(
        session.pick_corner(Point::new(97.0, 72.0), &view).unwrap(),
        Some(2)
    );
    assert_eq!(session.active_corner(), 2);
    assert_eq!(
        session.pick_corner(Point::new(50.0, 40.0), &view).unwrap(),
        None
    );
}

#[test]
fn test_render_marks_handles_only_while_editing() {
    let (_dir, mut session) = setup(1, 50);
    let options = session.config().render_options();
    let out = session.render_current(&options).unwrap();
    assert_eq!(out.image.dimensions(), (100, 75));
    assert!(out.outline.handles.is_none());

    session.apply(EditCommand::TogglePerspective).unwrap();
    let out = session.render_current(&options).unwrap();
    assert!(out.outline.handles.is_some());
}

// ---------------------------------------------------------------------------
// Export and project round trip
// ---------------------------------------------------------------------------

#[test]
fn test_save_requires_align_folder() {
    let (_dir, mut session) = setup(1, 50);
    let err = session.save_current_aligned().unwrap_err();
    assert!(matches!(err, AlignError::MissingOutputDir("align")));
}

#[test]
fn test_save_all_writes_full_resolution_pngs() {
    let (dir, mut session) = setup(2, 50);
    let out_dir = dir.path().join("align_out");
    session.set_output_dirs(Some(out_dir.clone()), None);
    session
        .apply(EditCommand::Translate { dx: 3.0, dy: 0.0 })
        .unwrap();

    let mut calls = Vec::new();
    let written = session
        .save_all_aligned(|done, total| calls.push((done, total)))
        .unwrap();
    assert_eq!(written.len(), 2);
    assert_eq!(calls, vec![(1, 2), (2, 2)]);

    let aligned = load_rgb(&out_dir.join("img_0.png")).unwrap();
    assert_eq!(aligned.dimensions(), (200, 150));
    // A 3 px preview shift is 6 px at full resolution: the left edge is empty.
    assert_eq!(aligned.get_pixel(2, 75).0, [0, 0, 0]);
    assert_ne!(aligned.get_pixel(10, 75).0, [0, 0, 0]);
}

fn write_project(dir: &Path, toml: &str) -> ProjectConfig {
    let path = dir.join("project.toml");
    std::fs::write(&path, toml).unwrap();
    ProjectConfig::load(&path).unwrap()
}

#[test]
fn test_project_params_restore_and_export() {
    let (dir, _session) = setup(2, 50);
    let project = write_project(
        dir.path(),
        r#"
[paths]
base_image = "base.png"
source_dir = "source"

[preview]
max_side = 100

[params."img_1.png"]
tx = 2.5
ty = -1.0
theta = 0.5
scale = 1.1
"#,
    );

    let mut session = EditingSession::from_project(&project).unwrap();
    assert_eq!(session.files().len(), 2);
    let p1 = session.files()[1].clone();
    assert_relative_eq!(session.params(&p1).tx, 2.5);
    assert_relative_eq!(session.params(&p1).scale, 1.1);
    assert_eq!(session.params(&session.files()[0].clone()), AlignmentParams::default());

    session.apply(EditCommand::Translate { dx: 1.0, dy: 1.0 }).unwrap();
    let mut out = project.clone();
    session.write_params(&mut out);
    assert_eq!(out.params.len(), 2);
    assert_relative_eq!(out.params["img_0.png"].tx, 1.0);
    assert_relative_eq!(out.params["img_1.png"].tx, 2.5);
}

#[test]
fn test_project_without_base_is_rejected() {
    let dir = TempDir::new().unwrap();
    let project = write_project(dir.path(), "[paths]\nsource_dir = \"source\"\n");
    assert!(matches!(
        EditingSession::from_project(&project),
        Err(AlignError::NoBaseImage)
    ));
}

#[test]
fn test_unknown_image_is_rejected() {
    let (dir, mut session) = setup(1, 50);
    let stranger = write_png(dir.path(), "elsewhere.png", &textured_rgb(200, 150, 7));
    assert!(matches!(
        session.scoring_job(&stranger),
        Err(AlignError::UnknownImage(_))
    ));
    assert!(session.scoring_job(&session.files()[0].clone()).is_ok());
}

// ---------------------------------------------------------------------------
// Live scoring
// ---------------------------------------------------------------------------

/// Keep polling at a fixed `now` until an update arrives.
fn wait_for_score(
    session: &mut EditingSession,
    debouncer: &mut Debouncer,
    scheduler: &SimilarityScheduler,
    now: Instant,
) -> ScoreUpdate {
    let deadline = Instant::now() + Duration::from_secs(60);
    loop {
        if let Some(update) = session.poll_scoring(debouncer, scheduler, now).unwrap() {
            return update;
        }
        assert!(Instant::now() < deadline, "no score arrived");
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_live_scoring_follows_current_params() {
    let (_dir, mut session) = setup(2, 50);
    let scheduler = SimilarityScheduler::with_threads(SimilarityConfig::default(), 1).unwrap();
    let mut debouncer = Debouncer::from_millis(180);
    let t0 = Instant::now();
    let dq = session.default_quad().unwrap();

    session
        .apply(EditCommand::Translate { dx: 4.0, dy: 0.0 })
        .unwrap();
    let path = session.current_path().unwrap().to_path_buf();
    let first = session.params(&path).signature(&dq);

    let update = wait_for_score(&mut session, &mut debouncer, &scheduler, t0);
    assert_eq!(update.path, path);
    assert_eq!(update.signature, first);
    assert_eq!(scheduler.cached_for(&path, first), Some(update.result));

    // A new edit leaves the cached score stale until it is rescored.
    session
        .apply(EditCommand::Translate { dx: 3.0, dy: 0.0 })
        .unwrap();
    let second = session.params(&path).signature(&dq);
    assert!(scheduler.cached(&path).is_some());
    assert_eq!(scheduler.cached_for(&path, second), None);

    // Inside the debounce interval nothing is submitted.
    let early = t0 + Duration::from_millis(50);
    assert!(session
        .poll_scoring(&mut debouncer, &scheduler, early)
        .unwrap()
        .is_none());
    assert_eq!(scheduler.in_flight(), 0);

    let later = t0 + Duration::from_millis(200);
    let update = wait_for_score(&mut session, &mut debouncer, &scheduler, later);
    assert_eq!(update.signature, second);
    assert_eq!(scheduler.cached_for(&path, second), Some(update.result));
}
