use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Detected interior corners of one view, in the same row-major raster order
/// as [`PatternSpec::object_points`](crate::PatternSpec::object_points):
/// index `r * cols + c` is the corner at grid row `r`, column `c`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CornerSet {
    rows: usize,
    cols: usize,
    points: Vec<Point2<f64>>,
}

impl CornerSet {
    /// Construct from raster-ordered points; `None` when the count does not
    /// match `rows * cols`.
    pub fn new(rows: usize, cols: usize, points: Vec<Point2<f64>>) -> Option<Self> {
        if points.len() != rows * cols {
            return None;
        }
        Some(Self { rows, cols, points })
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
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[inline]
    pub fn points(&self) -> &[Point2<f64>] {
        &self.points
    }

    /// Corner at grid row `r`, column `c`.
    #[inline]
    pub fn at(&self, r: usize, c: usize) -> Point2<f64> {
        self.points[r * self.cols + c]
    }

    pub fn into_points(self) -> Vec<Point2<f64>> {
        self.points
    }
}
