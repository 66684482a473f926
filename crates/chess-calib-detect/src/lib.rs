//! Chessboard interior-corner detector.
//!
//! The detector turns one grayscale photograph of a chessboard into a
//! raster-ordered set of sub-pixel interior corners:
//!
//! 1. adaptive thresholding isolates the dark squares ([`threshold`]),
//! 2. connected-component analysis extracts square-like quads ([`quads`]),
//! 3. quad corners merge into corner candidates that are linked into a
//!    lattice and ordered canonically ([`grid`]),
//! 4. gradient-weighted refinement recovers sub-pixel positions
//!    ([`subpixel`]).
//!
//! Failures are reported per view through [`DetectionFailure`] so a caller
//! can skip bad photographs and keep calibrating with the rest.

pub mod grid;
pub mod quads;
pub mod subpixel;
pub mod threshold;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use chess_calib_core::{CornerSet, GrayImageView, PatternSpec};

pub use grid::GridParams;
pub use quads::QuadFilter;
pub use subpixel::SubpixelParams;

/// Why a view produced no usable corner grid.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionFailure {
    /// Nothing resembling a chessboard in the image.
    #[error("no chessboard pattern found")]
    PatternNotFound,
    /// A board was found but some interior corners are missing or occluded.
    #[error("incomplete corner grid: found {found} of {expected} corners")]
    PartialGrid { found: usize, expected: usize },
    /// The corner structure has no single consistent grid interpretation.
    #[error("ambiguous grid topology or orientation")]
    AmbiguousTopology,
}

/// Detector tuning. The defaults suit well-lit boards that fill a
/// reasonable share of the frame; all stages can be adjusted independently.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorParams {
    /// Local-mean window half-width for thresholding; 0 picks a radius from
    /// the image size.
    pub threshold_window_radius: usize,
    /// How far below the local mean a pixel must be to count as dark.
    pub threshold_bias: f64,
    pub quad_filter: QuadFilter,
    pub grid: GridParams,
    pub subpixel: SubpixelParams,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            threshold_window_radius: 0,
            threshold_bias: 10.0,
            quad_filter: QuadFilter::default(),
            grid: GridParams::default(),
            subpixel: SubpixelParams::default(),
        }
    }
}

/// Finds the interior corners of a fixed chessboard pattern in grayscale
/// images.
#[derive(Clone, Debug)]
pub struct ChessboardDetector {
    pattern: PatternSpec,
    params: DetectorParams,
}

impl ChessboardDetector {
    pub fn new(pattern: PatternSpec, params: DetectorParams) -> Self {
        Self { pattern, params }
    }

    pub fn with_defaults(pattern: PatternSpec) -> Self {
        Self::new(pattern, DetectorParams::default())
    }

    #[inline]
    pub fn pattern(&self) -> &PatternSpec {
        &self.pattern
    }

    /// Detect the full interior-corner grid in one image.
    ///
    /// On success the corners come back in raster order matching
    /// [`PatternSpec::object_points`]: row by row, left to right, in the
    /// image frame.
    pub fn detect(&self, image: &GrayImageView<'_>) -> Result<CornerSet, DetectionFailure> {
        if image.is_empty() {
            return Err(DetectionFailure::PatternNotFound);
        }

        let mask = threshold::adaptive_threshold(
            image,
            self.params.threshold_window_radius,
            self.params.threshold_bias,
        );
        let mask = threshold::erode(&mask);

        let quads = quads::find_quads(&mask, &self.params.quad_filter);
        if quads.is_empty() {
            return Err(DetectionFailure::PatternNotFound);
        }

        let rows = self.pattern.rows();
        let cols = self.pattern.cols();
        let mut points = grid::assemble_grid(&quads, rows, cols, &self.params.grid)?;

        subpixel::refine_corners(image, &mut points, &self.params.subpixel);

        log::info!(
            "detected {}x{} corner grid from {} quads",
            rows,
            cols,
            quads.len()
        );
        CornerSet::new(rows, cols, points).ok_or(DetectionFailure::PatternNotFound)
    }
}
