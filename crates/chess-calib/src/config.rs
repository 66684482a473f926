use serde::{Deserialize, Serialize};

use chess_calib_core::PatternSpec;
use chess_calib_detect::DetectorParams;
use chess_calib_solve::SolveOptions;

/// Everything the pipeline needs to know for one calibration run.
///
/// The pattern is fixed for the whole run; all views must show the same
/// physical board.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub pattern: PatternSpec,
    /// Minimum number of views that must pass detection; never below 2.
    /// Two views only determine the model together with the zero-skew
    /// assumption; 10 or more well-spread views are recommended.
    pub min_views: usize,
    /// Refinement iteration cap; 0 keeps the closed-form solution.
    pub max_solver_iterations: usize,
    /// Relative cost decrease below which refinement stops.
    pub convergence_threshold: f64,
    /// Escalate validation findings and non-convergence to errors instead
    /// of flagging the result as low confidence.
    pub strict_validation: bool,
    /// Mean reprojection error (pixels) above which a result is suspect.
    pub max_reproj_error: f64,
    pub fix_k3: bool,
    pub fix_tangential: bool,
    pub detector: DetectorParams,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            pattern: PatternSpec::default(),
            min_views: 2,
            max_solver_iterations: 60,
            convergence_threshold: 1e-10,
            strict_validation: false,
            max_reproj_error: 1.0,
            fix_k3: true,
            fix_tangential: false,
            detector: DetectorParams::default(),
        }
    }
}

impl CalibrationConfig {
    pub fn with_pattern(pattern: PatternSpec) -> Self {
        Self {
            pattern,
            ..Self::default()
        }
    }

    #[inline]
    pub(crate) fn required_views(&self) -> usize {
        self.min_views.max(2)
    }

    pub(crate) fn solve_options(&self) -> SolveOptions {
        SolveOptions {
            max_iterations: self.max_solver_iterations,
            convergence_threshold: self.convergence_threshold,
            fix_k3: self.fix_k3,
            fix_tangential: self.fix_tangential,
        }
    }
}
