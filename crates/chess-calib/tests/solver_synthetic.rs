//! Solver-level scenarios on projected (not rendered) corner observations.

use chess_calib::core::{CornerSet, Distortion, Intrinsics, PatternSpec};
use chess_calib::solve::{solve, SolveError, SolveOptions};
use chess_calib::synthetic::{board_pose, jitter, project_corners};
use nalgebra::Isometry3;

fn camera() -> Intrinsics {
    Intrinsics {
        fx: 800.0,
        fy: 800.0,
        cx: 320.0,
        cy: 240.0,
        skew: 0.0,
    }
}

fn twelve_poses() -> Vec<Isometry3<f64>> {
    (0..12)
        .map(|k| {
            let phase = k as f64 * 0.5;
            board_pose(
                0.25 * phase.sin(),
                0.25 * phase.cos(),
                0.1 * (phase * 0.7).sin(),
                -120.0 + 10.0 * phase.cos(),
                -70.0 + 8.0 * phase.sin(),
                520.0 + 30.0 * (phase * 1.3).sin(),
            )
        })
        .collect()
}

fn observe(
    pattern: &PatternSpec,
    intr: &Intrinsics,
    dist: &Distortion,
    poses: &[Isometry3<f64>],
    sigma: f64,
) -> Vec<CornerSet> {
    poses
        .iter()
        .enumerate()
        .map(|(v, pose)| {
            let mut pts = project_corners(pattern, intr, dist, pose);
            for (c, p) in pts.iter_mut().enumerate() {
                p.x += jitter(v, c, 0, sigma);
                p.y += jitter(v, c, 1, sigma);
            }
            CornerSet::new(pattern.rows(), pattern.cols(), pts).expect("full grid")
        })
        .collect()
}

#[test]
fn twelve_noisy_views_recover_the_camera() {
    let pattern = PatternSpec::new(7, 11, 24.0).unwrap();
    let intr_gt = camera();
    let views = observe(
        &pattern,
        &intr_gt,
        &Distortion::default(),
        &twelve_poses(),
        0.1,
    );

    let report = solve(&pattern, &views, &SolveOptions::default(), &|| false).unwrap();

    assert!(
        (report.intrinsics.fx - intr_gt.fx).abs() < 0.01 * intr_gt.fx,
        "fx {} vs {}",
        report.intrinsics.fx,
        intr_gt.fx
    );
    assert!(
        (report.intrinsics.fy - intr_gt.fy).abs() < 0.01 * intr_gt.fy,
        "fy {} vs {}",
        report.intrinsics.fy,
        intr_gt.fy
    );
    assert!((report.intrinsics.cx - intr_gt.cx).abs() < 2.0);
    assert!((report.intrinsics.cy - intr_gt.cy).abs() < 2.0);
    // With sigma = 0.1 px per axis the residual floor sits near sigma.
    assert!(report.rms_error < 0.2, "rms {}", report.rms_error);
    assert_eq!(report.per_view_rms.len(), 12);
}

#[test]
fn lower_noise_means_lower_residuals() {
    let pattern = PatternSpec::new(7, 11, 24.0).unwrap();
    let intr = camera();
    let poses = twelve_poses();

    let quiet = observe(&pattern, &intr, &Distortion::default(), &poses, 0.05);
    let loud = observe(&pattern, &intr, &Distortion::default(), &poses, 0.3);

    let report_quiet = solve(&pattern, &quiet, &SolveOptions::default(), &|| false).unwrap();
    let report_loud = solve(&pattern, &loud, &SolveOptions::default(), &|| false).unwrap();

    assert!(report_quiet.rms_error < report_loud.rms_error);
}

#[test]
fn more_views_do_not_degrade_the_fit() {
    let pattern = PatternSpec::new(7, 11, 24.0).unwrap();
    let intr = camera();
    let views = observe(
        &pattern,
        &intr,
        &Distortion::default(),
        &twelve_poses(),
        0.1,
    );

    let half = solve(&pattern, &views[..6], &SolveOptions::default(), &|| false).unwrap();
    let full = solve(&pattern, &views, &SolveOptions::default(), &|| false).unwrap();

    // The residual floor is set by the observation noise; extra valid views
    // tighten the estimate instead of pushing the error up.
    assert!(
        full.rms_error <= half.rms_error + 0.02,
        "rms went {} -> {}",
        half.rms_error,
        full.rms_error
    );
}

#[test]
fn fronto_parallel_capture_is_rejected_as_degenerate() {
    let pattern = PatternSpec::new(7, 11, 24.0).unwrap();
    let intr = camera();
    // No tilt anywhere: the board stays parallel to the sensor, which leaves
    // the focal lengths unconstrained no matter how many views arrive.
    let poses: Vec<Isometry3<f64>> = (0..6)
        .map(|k| {
            let k = k as f64;
            board_pose(
                0.0,
                0.0,
                0.0,
                -130.0 + 12.0 * k,
                -80.0 + 9.0 * k,
                520.0 + 20.0 * k,
            )
        })
        .collect();
    let views = observe(&pattern, &intr, &Distortion::default(), &poses, 0.0);

    assert!(matches!(
        solve(&pattern, &views, &SolveOptions::default(), &|| false),
        Err(SolveError::DegenerateGeometry(_))
    ));
}

#[test]
fn distorted_observations_round_trip() {
    let pattern = PatternSpec::new(7, 11, 24.0).unwrap();
    let intr_gt = camera();
    let dist_gt = Distortion {
        k1: -0.2,
        k2: 0.06,
        p1: 0.0008,
        p2: -0.0005,
        ..Distortion::default()
    };
    let views = observe(&pattern, &intr_gt, &dist_gt, &twelve_poses(), 0.0);

    let report = solve(&pattern, &views, &SolveOptions::default(), &|| false).unwrap();

    // Reprojection through the recovered model reproduces the observations.
    assert!(report.rms_error < 1e-5, "rms {}", report.rms_error);
    assert!((report.distortion.k1 - dist_gt.k1).abs() < 1e-3);
    assert!((report.distortion.p1 - dist_gt.p1).abs() < 1e-4);
    // k3 stays fixed at zero under the default options.
    assert_eq!(report.distortion.k3, 0.0);
}

#[test]
fn one_view_is_rejected_at_the_boundary() {
    let pattern = PatternSpec::new(7, 11, 24.0).unwrap();
    let intr = camera();
    let poses = twelve_poses();
    let views = observe(&pattern, &intr, &Distortion::default(), &poses[..1], 0.0);

    assert!(matches!(
        solve(&pattern, &views, &SolveOptions::default(), &|| false),
        Err(SolveError::NotEnoughViews { got: 1, needed: 2 })
    ));

    let views = observe(&pattern, &intr, &Distortion::default(), &poses[..2], 0.0);
    let report = solve(&pattern, &views, &SolveOptions::default(), &|| false).unwrap();
    assert!(report.rms_error < 1e-6);
}
