//! Planar intrinsic calibration solver.
//!
//! Takes raster-ordered corner observations of a known chessboard in
//! several views and produces camera intrinsics, lens distortion and one
//! pose per view:
//!
//! 1. a plane homography per view ([`chess_calib_core::estimate_homography`]),
//! 2. closed-form intrinsics from the homography set ([`zhang`]),
//! 3. a pose per view by homography decomposition ([`pose`]),
//! 4. joint nonlinear refinement of everything ([`refine`]).

pub mod pose;
pub mod refine;
pub mod zhang;

use nalgebra::{Isometry3, Point2, Point3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use chess_calib_core::{
    estimate_homography, project_point, CornerSet, Distortion, Intrinsics, PatternSpec,
};

pub use refine::RefineOutcome;

/// Why the solver could not produce a calibration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SolveError {
    #[error("need at least {needed} views with detected corners, got {got}")]
    NotEnoughViews { got: usize, needed: usize },
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(&'static str),
    #[error("calibration was cancelled")]
    Cancelled,
}

/// Solver settings.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Refinement iteration cap; 0 skips refinement entirely.
    pub max_iterations: usize,
    /// Relative cost decrease below which refinement stops.
    pub convergence_threshold: f64,
    /// Keep the sixth-order radial term at zero. It is poorly constrained
    /// by typical board coverage and tends to absorb noise.
    pub fix_k3: bool,
    /// Keep the tangential terms at zero.
    pub fix_tangential: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iterations: 60,
            convergence_threshold: 1e-10,
            fix_k3: true,
            fix_tangential: false,
        }
    }
}

/// Full solver output.
#[derive(Clone, Debug)]
pub struct SolveReport {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
    /// Board-to-camera pose per input view, in input order.
    pub poses: Vec<Isometry3<f64>>,
    /// RMS reprojection error per view, pixels.
    pub per_view_rms: Vec<f64>,
    /// RMS reprojection error over all corners of all views, pixels.
    pub rms_error: f64,
    pub iterations: usize,
    pub converged: bool,
}

fn view_rms(
    intrinsics: &Intrinsics,
    distortion: &Distortion,
    pose: &Isometry3<f64>,
    object: &[Point3<f64>],
    observed: &[Point2<f64>],
) -> f64 {
    let mut sum = 0.0;
    for (obj, obs) in object.iter().zip(observed) {
        match project_point(intrinsics, distortion, pose, obj) {
            Some(uv) => {
                sum += (uv - obs).norm_squared();
            }
            None => {
                sum += f64::INFINITY;
            }
        }
    }
    (sum / object.len() as f64).sqrt()
}

/// Calibrate from corner sets, one per view.
///
/// Every corner set must cover the full pattern in raster order; views the
/// detector rejected must be filtered out by the caller beforehand.
pub fn solve(
    pattern: &PatternSpec,
    views: &[CornerSet],
    options: &SolveOptions,
    cancelled: &dyn Fn() -> bool,
) -> Result<SolveReport, SolveError> {
    if views.len() < 2 {
        return Err(SolveError::NotEnoughViews {
            got: views.len(),
            needed: 2,
        });
    }

    let object_2d = pattern.object_points_2d();
    let object = pattern.object_points();

    let mut homographies = Vec::with_capacity(views.len());
    for view in views {
        let h = estimate_homography(&object_2d, view.points()).ok_or(
            SolveError::DegenerateGeometry("homography estimation failed for a view"),
        )?;
        homographies.push(h.h);
    }

    let intrinsics = zhang::intrinsics_from_homographies(&homographies)?;
    log::info!(
        "closed-form intrinsics: fx {:.1} fy {:.1} cx {:.1} cy {:.1} skew {:.3}",
        intrinsics.fx,
        intrinsics.fy,
        intrinsics.cx,
        intrinsics.cy,
        intrinsics.skew
    );

    let k = intrinsics.k_matrix();
    let mut poses = Vec::with_capacity(views.len());
    for h in &homographies {
        poses.push(pose::pose_from_homography(&k, h)?);
    }

    let observed: Vec<Vec<Point2<f64>>> = views.iter().map(|v| v.points().to_vec()).collect();
    let outcome = refine::refine(
        &object,
        &observed,
        intrinsics,
        Distortion::default(),
        poses,
        options,
        cancelled,
    )?;

    let per_view_rms: Vec<f64> = outcome
        .poses
        .iter()
        .zip(&observed)
        .map(|(pose, obs)| view_rms(&outcome.intrinsics, &outcome.distortion, pose, &object, obs))
        .collect();

    Ok(SolveReport {
        intrinsics: outcome.intrinsics,
        distortion: outcome.distortion,
        poses: outcome.poses,
        per_view_rms,
        rms_error: outcome.rms,
        iterations: outcome.iterations,
        converged: outcome.converged,
    })
}
