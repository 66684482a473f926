//! Dark-quad extraction from the binary mask.
//!
//! The dark board squares survive thresholding and erosion as isolated
//! 4-connected components. Each accepted component contributes its four
//! extremal corners; the corners of adjacent quads later merge into
//! interior-corner candidates.

use nalgebra::{Point2, Vector2};

use crate::threshold::BinaryMask;

/// One dark square candidate with its four corner estimates.
#[derive(Clone, Debug)]
pub struct Quad {
    pub centroid: Point2<f64>,
    pub area: usize,
    pub corners: [Point2<f64>; 4],
}

/// Geometric acceptance limits for dark components.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct QuadFilter {
    /// Minimum pixel count; kills specks left by noise.
    pub min_area: usize,
    /// Maximum pixel count, as a fraction of the whole image.
    pub max_area_fraction: f64,
    /// Accepted range of `area / bounding_box_area`; a projected square
    /// stays well filled, thin arcs and text strokes do not.
    pub min_fill_ratio: f64,
}

impl Default for QuadFilter {
    fn default() -> Self {
        Self {
            min_area: 25,
            max_area_fraction: 0.25,
            min_fill_ratio: 0.4,
        }
    }
}

struct Component {
    pixels: Vec<(usize, usize)>,
    min_x: usize,
    max_x: usize,
    min_y: usize,
    max_y: usize,
}

fn flood_fill(
    mask: &BinaryMask,
    labels: &mut [u32],
    start: (usize, usize),
    label: u32,
) -> Component {
    let w = mask.width;
    let h = mask.height;
    let mut stack = vec![start];
    labels[start.1 * w + start.0] = label;

    let mut comp = Component {
        pixels: Vec::new(),
        min_x: start.0,
        max_x: start.0,
        min_y: start.1,
        max_y: start.1,
    };

    while let Some((x, y)) = stack.pop() {
        comp.pixels.push((x, y));
        comp.min_x = comp.min_x.min(x);
        comp.max_x = comp.max_x.max(x);
        comp.min_y = comp.min_y.min(y);
        comp.max_y = comp.max_y.max(y);

        let mut visit = |nx: usize, ny: usize| {
            let idx = ny * w + nx;
            if mask.data[idx] && labels[idx] == 0 {
                labels[idx] = label;
                stack.push((nx, ny));
            }
        };

        if x > 0 {
            visit(x - 1, y);
        }
        if x + 1 < w {
            visit(x + 1, y);
        }
        if y > 0 {
            visit(x, y - 1);
        }
        if y + 1 < h {
            visit(x, y + 1);
        }
    }

    comp
}

/// Corner extraction by extremal projection: for a roughly square blob the
/// four pixels maximizing `+-x +- y` (in a frame rotated to the blob's
/// diagonal) are its corners. Using the two fixed diagonal directions of the
/// image frame is enough because the later sub-pixel pass re-centers each
/// corner anyway.
fn extremal_corners(pixels: &[(usize, usize)]) -> [Point2<f64>; 4] {
    let dirs = [
        Vector2::new(1.0, 1.0),
        Vector2::new(1.0, -1.0),
        Vector2::new(-1.0, -1.0),
        Vector2::new(-1.0, 1.0),
    ];

    let mut corners = [Point2::origin(); 4];
    for (k, dir) in dirs.iter().enumerate() {
        let mut best = f64::NEG_INFINITY;
        for &(x, y) in pixels {
            let score = dir.x * x as f64 + dir.y * y as f64;
            if score > best {
                best = score;
                corners[k] = Point2::new(x as f64, y as f64);
            }
        }
    }
    corners
}

/// Label 4-connected dark components and keep the square-like ones.
pub fn find_quads(mask: &BinaryMask, filter: &QuadFilter) -> Vec<Quad> {
    let w = mask.width;
    let h = mask.height;
    if w == 0 || h == 0 {
        return Vec::new();
    }

    let max_area = ((w * h) as f64 * filter.max_area_fraction) as usize;
    let mut labels = vec![0u32; w * h];
    let mut next_label = 1u32;
    let mut quads = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = y * w + x;
            if !mask.data[idx] || labels[idx] != 0 {
                continue;
            }
            let comp = flood_fill(mask, &mut labels, (x, y), next_label);
            next_label += 1;

            let area = comp.pixels.len();
            if area < filter.min_area || area > max_area {
                continue;
            }

            let bbox_w = comp.max_x - comp.min_x + 1;
            let bbox_h = comp.max_y - comp.min_y + 1;
            let fill = area as f64 / (bbox_w * bbox_h) as f64;
            if fill < filter.min_fill_ratio {
                continue;
            }

            let mut cx = 0.0;
            let mut cy = 0.0;
            for &(px, py) in &comp.pixels {
                cx += px as f64;
                cy += py as f64;
            }
            cx /= area as f64;
            cy /= area as f64;

            quads.push(Quad {
                centroid: Point2::new(cx, cy),
                area,
                corners: extremal_corners(&comp.pixels),
            });
        }
    }

    log::debug!(
        "quad extraction: {} components labeled, {} accepted",
        next_label - 1,
        quads.len()
    );
    quads
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_calib_core::GrayImage;

    fn mask_from_fn(w: usize, h: usize, f: impl Fn(usize, usize) -> bool) -> BinaryMask {
        let img = GrayImage::from_fn(w, h, |x, y| if f(x, y) { 0 } else { 255 });
        crate::threshold::adaptive_threshold(&img.view(), w / 4, 10.0)
    }

    #[test]
    fn finds_two_separated_squares() {
        let mask = mask_from_fn(60, 30, |x, y| {
            let in_a = (5..15).contains(&x) && (5..15).contains(&y);
            let in_b = (35..45).contains(&x) && (10..20).contains(&y);
            in_a || in_b
        });
        let quads = find_quads(&mask, &QuadFilter::default());
        assert_eq!(quads.len(), 2);
    }

    #[test]
    fn rejects_tiny_specks() {
        let mask = mask_from_fn(40, 40, |x, y| x == 10 && y == 10);
        let quads = find_quads(&mask, &QuadFilter::default());
        assert!(quads.is_empty());
    }

    #[test]
    fn square_corners_are_near_bbox_extremes() {
        let mask = mask_from_fn(40, 40, |x, y| (10..26).contains(&x) && (12..28).contains(&y));
        let quads = find_quads(&mask, &QuadFilter::default());
        assert_eq!(quads.len(), 1);
        let q = &quads[0];
        for corner in &q.corners {
            assert!(corner.x >= 9.0 && corner.x <= 26.0);
            assert!(corner.y >= 11.0 && corner.y <= 28.0);
        }
        assert!((q.centroid.x - 17.5).abs() < 1.0);
        assert!((q.centroid.y - 19.5).abs() < 1.0);
    }

    #[test]
    fn rejects_thin_diagonal_strokes() {
        let mask = mask_from_fn(60, 60, |x, y| {
            let d = x as i64 - y as i64;
            (0..3).contains(&d) && x > 5 && x < 55
        });
        let quads = find_quads(&mask, &QuadFilter::default());
        assert!(quads.is_empty());
    }
}
