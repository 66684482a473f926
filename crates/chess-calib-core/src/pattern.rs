use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid pattern geometry.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PatternSpecError {
    #[error("pattern needs at least 2x2 interior corners, got {rows}x{cols}")]
    GridTooSmall { rows: usize, cols: usize },
    #[error("square edge length must be positive")]
    NonPositiveSquareSize,
}

/// Physical description of the chessboard: interior corner grid and square
/// edge length. Constant for a whole calibration session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    rows: usize,
    cols: usize,
    square_size: f64,
}

impl Default for PatternSpec {
    /// The common 7x11 interior-corner board with 24 mm squares.
    fn default() -> Self {
        Self {
            rows: 7,
            cols: 11,
            square_size: 24.0,
        }
    }
}

impl PatternSpec {
    /// `rows` x `cols` interior corners, squares of `square_size` (typically
    /// millimeters; the unit propagates into translations).
    pub fn new(rows: usize, cols: usize, square_size: f64) -> Result<Self, PatternSpecError> {
        if rows < 2 || cols < 2 {
            return Err(PatternSpecError::GridTooSmall { rows, cols });
        }
        if !(square_size > 0.0) {
            return Err(PatternSpecError::NonPositiveSquareSize);
        }
        Ok(Self {
            rows,
            cols,
            square_size,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn square_size(&self) -> f64 {
        self.square_size
    }

    #[inline]
    pub fn corner_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Board-frame corner positions on the `z = 0` plane, row-major:
    /// index `r * cols + c` maps to `(c * square_size, r * square_size, 0)`.
    pub fn object_points(&self) -> Vec<Point3<f64>> {
        let mut points = Vec::with_capacity(self.corner_count());
        for r in 0..self.rows {
            for c in 0..self.cols {
                points.push(Point3::new(
                    c as f64 * self.square_size,
                    r as f64 * self.square_size,
                    0.0,
                ));
            }
        }
        points
    }

    /// Same grid as [`object_points`](Self::object_points) with the z = 0
    /// coordinate dropped; this is the homography-side parameterization.
    pub fn object_points_2d(&self) -> Vec<Point2<f64>> {
        let mut points = Vec::with_capacity(self.corner_count());
        for r in 0..self.rows {
            for c in 0..self.cols {
                points.push(Point2::new(
                    c as f64 * self.square_size,
                    r as f64 * self.square_size,
                ));
            }
        }
        points
    }
}
