use std::fmt;

use nalgebra::{Rotation3, Vector3};
use serde::{Deserialize, Serialize};

use chess_calib_core::{Distortion, Intrinsics};
use chess_calib_detect::DetectionFailure;

/// Per-input-image outcome of the detection stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViewStatus {
    Detected,
    Skipped(DetectionFailure),
    /// Detection had not finished before the run was cancelled. Never
    /// present in a completed [`CalibrationResult`].
    Pending,
}

impl ViewStatus {
    #[inline]
    pub fn is_detected(&self) -> bool {
        matches!(self, ViewStatus::Detected)
    }
}

/// Board pose of one detected view.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ViewPose {
    /// Index of the source image in the pipeline input.
    pub view_index: usize,
    /// Board-to-camera rotation.
    pub rotation: Rotation3<f64>,
    /// Board-to-camera translation, in the pattern's length unit.
    pub translation: Vector3<f64>,
}

/// Output of a completed calibration run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
    /// One pose per detected view; skipped images contribute nothing.
    pub poses: Vec<ViewPose>,
    /// Mean Euclidean reprojection error over all corners of all detected
    /// views, pixels.
    pub mean_reproj_error: f64,
    /// RMS reprojection error over the same corners, pixels.
    pub rms_error: f64,
    /// Mean reprojection error per detected view, aligned with `poses`.
    pub per_view_errors: Vec<f64>,
    /// Detection outcome per input image, in input order.
    pub view_statuses: Vec<ViewStatus>,
    pub iterations: usize,
    pub converged: bool,
    /// Set in lenient mode when validation found something suspect; the
    /// findings are in `warnings`.
    pub low_confidence: bool,
    pub warnings: Vec<String>,
}

impl CalibrationResult {
    pub fn detected_views(&self) -> usize {
        self.poses.len()
    }
}

/// The camera matrix and distortion in a fixed-width human-readable block.
pub fn format_intrinsics(intrinsics: &Intrinsics, distortion: &Distortion) -> String {
    let k = intrinsics.k_matrix();
    let mut out = String::from("camera matrix K:\n");
    for r in 0..3 {
        out.push_str(&format!(
            "  [{:12.4} {:12.4} {:12.4}]\n",
            k[(r, 0)],
            k[(r, 1)],
            k[(r, 2)]
        ));
    }
    out.push_str(&format!(
        "distortion: k1 {:+.6} k2 {:+.6} k3 {:+.6} p1 {:+.6} p2 {:+.6}",
        distortion.k1, distortion.k2, distortion.k3, distortion.p1, distortion.p2
    ));
    out
}

impl fmt::Display for CalibrationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", format_intrinsics(&self.intrinsics, &self.distortion))?;
        writeln!(
            f,
            "views: {} used, {} skipped",
            self.poses.len(),
            self.view_statuses.len() - self.poses.len()
        )?;
        writeln!(
            f,
            "reprojection error: {:.4} px mean, {:.4} px rms ({} iterations, converged: {})",
            self.mean_reproj_error, self.rms_error, self.iterations, self.converged
        )?;
        if self.low_confidence {
            writeln!(f, "low confidence:")?;
            for w in &self.warnings {
                writeln!(f, "  - {w}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result() -> CalibrationResult {
        CalibrationResult {
            intrinsics: Intrinsics {
                fx: 800.0,
                fy: 780.0,
                cx: 320.0,
                cy: 240.0,
                skew: 0.0,
            },
            distortion: Distortion {
                k1: -0.1,
                ..Distortion::default()
            },
            poses: vec![ViewPose {
                view_index: 0,
                rotation: Rotation3::identity(),
                translation: Vector3::new(0.0, 0.0, 500.0),
            }],
            mean_reproj_error: 0.12,
            rms_error: 0.15,
            per_view_errors: vec![0.12],
            view_statuses: vec![
                ViewStatus::Detected,
                ViewStatus::Skipped(DetectionFailure::PatternNotFound),
            ],
            iterations: 12,
            converged: true,
            low_confidence: false,
            warnings: Vec::new(),
        }
    }

    #[test]
    fn display_mentions_key_numbers() {
        let text = sample_result().to_string();
        assert!(text.contains("800.0000"));
        assert!(text.contains("1 used, 1 skipped"));
        assert!(text.contains("converged: true"));
    }

    #[test]
    fn result_round_trips_through_json() {
        let result = sample_result();
        let json = serde_json::to_string(&result).unwrap();
        let back: CalibrationResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.poses.len(), 1);
        assert_eq!(back.view_statuses, result.view_statuses);
        assert_eq!(back.intrinsics, result.intrinsics);
    }
}
