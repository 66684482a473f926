//! The calibration pipeline: detection fan-out, solving, validation.

use rayon::prelude::*;
use thiserror::Error;

use chess_calib_core::{project_point, CornerSet, GrayImageView};
use chess_calib_detect::{ChessboardDetector, DetectionFailure};
use chess_calib_solve::{solve, SolveError, SolveReport};

use crate::cancel::CancelToken;
use crate::config::CalibrationConfig;
use crate::correspond::Correspondences;
use crate::result::{CalibrationResult, ViewPose, ViewStatus};
use crate::validate::validate_intrinsics;

/// Terminal pipeline failures. Detection problems in individual images are
/// not errors; they surface as [`ViewStatus::Skipped`] entries carried by
/// the error or result.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("only {detected} of the required {required} views passed detection")]
    InsufficientViews {
        detected: usize,
        required: usize,
        statuses: Vec<ViewStatus>,
    },
    #[error("degenerate view geometry: {reason}")]
    DegenerateGeometry {
        reason: &'static str,
        statuses: Vec<ViewStatus>,
    },
    #[error("solver did not converge after {iterations} iterations (rms {rms:.4} px)")]
    NonConvergence {
        iterations: usize,
        rms: f64,
        statuses: Vec<ViewStatus>,
    },
    #[error("calibration result failed validation: {}", reasons.join("; "))]
    InvalidResult {
        reasons: Vec<String>,
        statuses: Vec<ViewStatus>,
    },
    /// Statuses stay aligned with the inputs; views whose detection had
    /// not finished when the token fired are [`ViewStatus::Pending`].
    #[error("calibration was cancelled")]
    Cancelled { statuses: Vec<ViewStatus> },
}

/// Internal progress marker, logged at each transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PipelineState {
    Idle,
    CollectingViews,
    Detecting,
    Solving,
    Calibrated,
    Failed,
}

fn transition(state: &mut PipelineState, next: PipelineState) {
    log::debug!("pipeline: {state:?} -> {next:?}");
    *state = next;
}

/// Calibrate from a batch of grayscale views.
///
/// Images that fail detection are skipped with a recorded reason; the run
/// only fails if fewer than `min_views` remain, the geometry is degenerate,
/// or (in strict mode) the result does not validate.
pub fn run_calibration(
    images: &[GrayImageView<'_>],
    config: &CalibrationConfig,
) -> Result<CalibrationResult, CalibrationError> {
    run_calibration_cancellable(images, config, &CancelToken::new())
}

/// Like [`run_calibration`], checking `cancel` between images and between
/// solver iterations. A cancelled run never yields a partial result.
pub fn run_calibration_cancellable(
    images: &[GrayImageView<'_>],
    config: &CalibrationConfig,
    cancel: &CancelToken,
) -> Result<CalibrationResult, CalibrationError> {
    let mut state = PipelineState::Idle;
    transition(&mut state, PipelineState::CollectingViews);
    log::info!(
        "calibrating from {} views of a {}x{} pattern",
        images.len(),
        config.pattern.rows(),
        config.pattern.cols()
    );

    transition(&mut state, PipelineState::Detecting);
    let detector = ChessboardDetector::new(config.pattern, config.detector.clone());
    // One parallel task per image; `None` marks views whose task started
    // after the token fired. Input order is restored by the indexed collect.
    let outcomes: Vec<Option<Result<CornerSet, DetectionFailure>>> = images
        .par_iter()
        .map(|image| {
            if cancel.is_cancelled() {
                return None;
            }
            Some(detector.detect(image))
        })
        .collect();

    let mut statuses = Vec::with_capacity(images.len());
    let mut correspondences = Vec::new();
    let mut corner_sets = Vec::new();
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Some(Ok(corners)) => {
                statuses.push(ViewStatus::Detected);
                correspondences.push(Correspondences::new(&config.pattern, index, &corners));
                corner_sets.push(corners);
            }
            Some(Err(failure)) => {
                log::warn!("view {index} skipped: {failure}");
                statuses.push(ViewStatus::Skipped(failure));
            }
            None => statuses.push(ViewStatus::Pending),
        }
    }
    if cancel.is_cancelled() {
        transition(&mut state, PipelineState::Failed);
        return Err(CalibrationError::Cancelled { statuses });
    }

    let required = config.required_views();
    if corner_sets.len() < required {
        transition(&mut state, PipelineState::Failed);
        return Err(CalibrationError::InsufficientViews {
            detected: corner_sets.len(),
            required,
            statuses,
        });
    }

    transition(&mut state, PipelineState::Solving);
    let options = config.solve_options();
    let report = match solve(&config.pattern, &corner_sets, &options, &|| {
        cancel.is_cancelled()
    }) {
        Ok(report) => report,
        Err(SolveError::Cancelled) => {
            transition(&mut state, PipelineState::Failed);
            return Err(CalibrationError::Cancelled { statuses });
        }
        Err(SolveError::DegenerateGeometry(reason)) => {
            transition(&mut state, PipelineState::Failed);
            return Err(CalibrationError::DegenerateGeometry { reason, statuses });
        }
        Err(SolveError::NotEnoughViews { got, needed }) => {
            transition(&mut state, PipelineState::Failed);
            return Err(CalibrationError::InsufficientViews {
                detected: got,
                required: needed,
                statuses,
            });
        }
    };

    if config.strict_validation && !report.converged {
        transition(&mut state, PipelineState::Failed);
        return Err(CalibrationError::NonConvergence {
            iterations: report.iterations,
            rms: report.rms_error,
            statuses,
        });
    }

    let (per_view_errors, mean_reproj_error) = reprojection_errors(&report, &correspondences);
    let mut warnings = validate_intrinsics(
        &report.intrinsics,
        images[0].width,
        images[0].height,
        mean_reproj_error,
        config,
    );
    if !report.converged {
        warnings.push(format!(
            "solver stopped after {} iterations without converging",
            report.iterations
        ));
    }

    if config.strict_validation && !warnings.is_empty() {
        transition(&mut state, PipelineState::Failed);
        return Err(CalibrationError::InvalidResult {
            reasons: warnings,
            statuses,
        });
    }

    transition(&mut state, PipelineState::Calibrated);
    let low_confidence = !warnings.is_empty();
    for warning in &warnings {
        log::warn!("low confidence: {warning}");
    }

    let poses = report
        .poses
        .iter()
        .zip(&correspondences)
        .map(|(pose, c)| ViewPose {
            view_index: c.view_index,
            rotation: pose.rotation.to_rotation_matrix(),
            translation: pose.translation.vector,
        })
        .collect();

    Ok(CalibrationResult {
        intrinsics: report.intrinsics,
        distortion: report.distortion,
        poses,
        mean_reproj_error,
        rms_error: report.rms_error,
        per_view_errors,
        view_statuses: statuses,
        iterations: report.iterations,
        converged: report.converged,
        low_confidence,
        warnings,
    })
}

/// Mean Euclidean reprojection error per view and overall, pixels.
fn reprojection_errors(
    report: &SolveReport,
    correspondences: &[Correspondences],
) -> (Vec<f64>, f64) {
    let mut per_view = Vec::with_capacity(correspondences.len());
    let mut total = 0.0;
    let mut count = 0usize;

    for (pose, c) in report.poses.iter().zip(correspondences) {
        let mut sum = 0.0;
        for (obj, obs) in c.object.iter().zip(&c.image) {
            let err = match project_point(&report.intrinsics, &report.distortion, pose, obj) {
                Some(uv) => (uv - obs).norm(),
                None => f64::INFINITY,
            };
            sum += err;
        }
        total += sum;
        count += c.len();
        per_view.push(sum / c.len() as f64);
    }

    (per_view, total / count.max(1) as f64)
}
