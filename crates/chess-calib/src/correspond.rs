use nalgebra::{Point2, Point3};

use chess_calib_core::{CornerSet, PatternSpec};

/// Paired board-frame and image-frame points of one detected view, in the
/// shared raster order. Construction cannot fail for a well-formed
/// [`CornerSet`]; both sequences always have the same length.
#[derive(Clone, Debug)]
pub struct Correspondences {
    /// Index of the source image in the pipeline input.
    pub view_index: usize,
    pub object: Vec<Point3<f64>>,
    pub image: Vec<Point2<f64>>,
}

impl Correspondences {
    pub fn new(pattern: &PatternSpec, view_index: usize, corners: &CornerSet) -> Self {
        Self {
            view_index,
            object: pattern.object_points(),
            image: corners.points().to_vec(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.object.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.object.is_empty()
    }
}
