//! Grid assembly: quad corners -> interior-corner candidates -> lattice.
//!
//! Interior corners of a chessboard are exactly the points where two dark
//! squares touch diagonally, so every interior corner receives one corner
//! estimate from each of the two quads. Pair-merging nearby corners from
//! different quads yields the candidates and simultaneously discards the
//! outer board corners, which have no partner. The candidates are then
//! connected into a 4-neighbor lattice along the dominant grid axes, walked
//! into integer coordinates, and brought into a canonical raster order.

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Point2, Rotation2, Vector2};
use std::collections::VecDeque;

use crate::quads::Quad;
use crate::DetectionFailure;

/// Tuning for candidate merging and lattice linking.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct GridParams {
    /// Maximum distance between two quad corners merged into one candidate.
    pub merge_radius_px: f64,
    /// Accepted neighbor distance, as a fraction of the median spacing.
    pub min_spacing_factor: f64,
    pub max_spacing_factor: f64,
    /// Maximum deviation of a neighbor link from the grid axes, degrees.
    pub axis_tolerance_deg: f64,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            merge_radius_px: 6.0,
            min_spacing_factor: 0.5,
            max_spacing_factor: 2.0,
            axis_tolerance_deg: 25.0,
        }
    }
}

/// Merge quad corners pairwise: a candidate is the midpoint of two mutually
/// nearest corners from different quads within the merge radius. Unpaired
/// corners (outer board corners, clutter) are dropped.
pub(crate) fn merge_quad_corners(quads: &[Quad], merge_radius_px: f64) -> Vec<Point2<f64>> {
    let mut corners = Vec::with_capacity(quads.len() * 4);
    let mut owner = Vec::with_capacity(quads.len() * 4);
    for (qi, quad) in quads.iter().enumerate() {
        for corner in &quad.corners {
            corners.push(*corner);
            owner.push(qi);
        }
    }
    if corners.len() < 2 {
        return Vec::new();
    }

    let coords: Vec<[f64; 2]> = corners.iter().map(|p| [p.x, p.y]).collect();
    let tree: KdTree<f64, 2> = (&coords).into();

    let r2 = merge_radius_px * merge_radius_px;
    let mut partner = vec![usize::MAX; corners.len()];
    for (i, c) in coords.iter().enumerate() {
        // k = 2: the query point itself plus its nearest other corner.
        let results = tree.nearest_n::<SquaredEuclidean>(c, 2);
        for nn in results {
            let j = nn.item as usize;
            if j == i {
                continue;
            }
            if nn.distance <= r2 && owner[j] != owner[i] {
                partner[i] = j;
            }
        }
    }

    let mut candidates = Vec::new();
    for i in 0..corners.len() {
        let j = partner[i];
        if j != usize::MAX && j > i && partner[j] == i {
            candidates.push(Point2::from((corners[i].coords + corners[j].coords) * 0.5));
        }
    }
    candidates
}

/// Dominant grid axis angle in `[-pi/4, pi/4)`, from the circular mean of
/// quadrupled neighbor-vector angles. Quadrupling makes the four lattice
/// directions (0, 90, 180, 270 degrees apart) reinforce instead of cancel.
pub(crate) fn dominant_axis_angle(candidates: &[Point2<f64>], tree: &KdTree<f64, 2>) -> f64 {
    let k = candidates.len().min(5);
    let mut sx = 0.0;
    let mut sy = 0.0;
    for p in candidates {
        let results = tree.nearest_n::<SquaredEuclidean>(&[p.x, p.y], k);
        for nn in results {
            let q = candidates[nn.item as usize];
            let d = q - p;
            if d.norm_squared() < 1e-9 {
                continue;
            }
            let a = 4.0 * d.y.atan2(d.x);
            sx += a.cos();
            sy += a.sin();
        }
    }
    sy.atan2(sx) / 4.0
}

/// Median distance to the nearest other candidate.
pub(crate) fn median_spacing(candidates: &[Point2<f64>], tree: &KdTree<f64, 2>) -> f64 {
    let mut dists = Vec::with_capacity(candidates.len());
    for (i, p) in candidates.iter().enumerate() {
        let results = tree.nearest_n::<SquaredEuclidean>(&[p.x, p.y], 2);
        for nn in results {
            if nn.item as usize != i {
                dists.push(nn.distance.sqrt());
            }
        }
    }
    dists.sort_by(|a, b| a.total_cmp(b));
    dists[dists.len() / 2]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Direction {
    Right,
    Left,
    Up,
    Down,
}

#[derive(Clone, Copy, Debug)]
struct Link {
    index: usize,
    direction: Direction,
    distance: f64,
}

/// Per-node outgoing links, at most one per direction (closest wins).
fn build_lattice(
    candidates: &[Point2<f64>],
    tree: &KdTree<f64, 2>,
    axis_angle: f64,
    spacing: f64,
    params: &GridParams,
) -> Vec<Vec<Link>> {
    let rot = Rotation2::new(-axis_angle);
    let min_d = params.min_spacing_factor * spacing;
    let max_d = params.max_spacing_factor * spacing;
    let tan_tol = params.axis_tolerance_deg.to_radians().tan();
    let k = candidates.len().min(9);

    let mut lattice = Vec::with_capacity(candidates.len());
    for (i, p) in candidates.iter().enumerate() {
        let mut best: [Option<Link>; 4] = [None; 4];

        let results = tree.nearest_n::<SquaredEuclidean>(&[p.x, p.y], k);
        for nn in results {
            let j = nn.item as usize;
            if j == i {
                continue;
            }
            let d: Vector2<f64> = rot * (candidates[j] - p);
            let dist = d.norm();
            if dist < min_d || dist > max_d {
                continue;
            }

            let (direction, on_axis, off_axis) = if d.x.abs() >= d.y.abs() {
                let dir = if d.x > 0.0 {
                    Direction::Right
                } else {
                    Direction::Left
                };
                (dir, d.x.abs(), d.y.abs())
            } else {
                let dir = if d.y > 0.0 {
                    Direction::Down
                } else {
                    Direction::Up
                };
                (dir, d.y.abs(), d.x.abs())
            };
            if off_axis > on_axis * tan_tol {
                continue;
            }

            let slot = direction as usize;
            if best[slot].is_none_or(|b| dist < b.distance) {
                best[slot] = Some(Link {
                    index: j,
                    direction,
                    distance: dist,
                });
            }
        }

        lattice.push(best.into_iter().flatten().collect());
    }
    lattice
}

/// BFS over the lattice assigning integer grid coordinates; first visit
/// wins, revisits are skipped. Returns the components as
/// `(candidate_index, col, row)` lists.
fn connected_components(lattice: &[Vec<Link>]) -> Vec<Vec<(usize, i64, i64)>> {
    let n = lattice.len();
    let mut visited = vec![false; n];
    let mut components = Vec::new();

    for start in 0..n {
        if visited[start] {
            continue;
        }
        let mut component = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back((start, 0i64, 0i64));

        while let Some((node, i, j)) = queue.pop_front() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push((node, i, j));

            for link in &lattice[node] {
                let (di, dj) = match link.direction {
                    Direction::Right => (1, 0),
                    Direction::Left => (-1, 0),
                    Direction::Up => (0, -1),
                    Direction::Down => (0, 1),
                };
                queue.push_back((link.index, i + di, j + dj));
            }
        }
        components.push(component);
    }
    components
}

/// Check that the component tiles a full `gh x gw` rectangle with one
/// candidate per cell; returns the occupancy as `cell[r][c] = candidate`.
fn occupancy_grid(
    component: &[(usize, i64, i64)],
    expected: usize,
) -> Result<Vec<Vec<usize>>, DetectionFailure> {
    let min_i = component.iter().map(|&(_, i, _)| i).min().unwrap_or(0);
    let min_j = component.iter().map(|&(_, _, j)| j).min().unwrap_or(0);
    let max_i = component.iter().map(|&(_, i, _)| i).max().unwrap_or(0);
    let max_j = component.iter().map(|&(_, _, j)| j).max().unwrap_or(0);

    let gw = (max_i - min_i + 1) as usize;
    let gh = (max_j - min_j + 1) as usize;

    let mut cells = vec![vec![usize::MAX; gw]; gh];
    let mut filled = 0usize;
    for &(node, i, j) in component {
        let c = (i - min_i) as usize;
        let r = (j - min_j) as usize;
        if cells[r][c] != usize::MAX {
            return Err(DetectionFailure::PartialGrid {
                found: filled,
                expected,
            });
        }
        cells[r][c] = node;
        filled += 1;
    }

    if cells.iter().any(|row| row.iter().any(|&c| c == usize::MAX)) {
        return Err(DetectionFailure::PartialGrid {
            found: filled,
            expected,
        });
    }
    Ok(cells)
}

/// Reorder the occupancy grid into the canonical raster order: columns step
/// rightwards in the image (positive mean x step), rows step downwards
/// (positive mean y step). Of the eight axis-aligned relabelings exactly one
/// must satisfy both conditions with the target dimensions, otherwise the
/// view has no deterministic orientation.
fn canonical_raster(
    cells: &[Vec<usize>],
    candidates: &[Point2<f64>],
    rows: usize,
    cols: usize,
    spacing: f64,
) -> Result<Vec<Point2<f64>>, DetectionFailure> {
    let gh = cells.len();
    let gw = cells[0].len();
    let eps = 0.05 * spacing;

    let mut accepted: Vec<Vec<Point2<f64>>> = Vec::new();

    for transform in 0..8u8 {
        let swap = transform & 4 != 0;
        let flip_r = transform & 2 != 0;
        let flip_c = transform & 1 != 0;

        let (th, tw) = if swap { (gw, gh) } else { (gh, gw) };
        if th != rows || tw != cols {
            continue;
        }

        let mut points = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                let (a, b) = if swap { (c, r) } else { (r, c) };
                let sr = if flip_r { gh - 1 - a } else { a };
                let sc = if flip_c { gw - 1 - b } else { b };
                points.push(candidates[cells[sr][sc]]);
            }
        }

        let mut col_step_x = 0.0;
        let mut row_step_y = 0.0;
        for r in 0..rows {
            for c in 0..cols.saturating_sub(1) {
                col_step_x += points[r * cols + c + 1].x - points[r * cols + c].x;
            }
        }
        for r in 0..rows.saturating_sub(1) {
            for c in 0..cols {
                row_step_y += points[(r + 1) * cols + c].y - points[r * cols + c].y;
            }
        }
        let col_steps = (rows * (cols - 1)).max(1) as f64;
        let row_steps = ((rows - 1) * cols).max(1) as f64;

        if col_step_x / col_steps > eps && row_step_y / row_steps > eps {
            accepted.push(points);
        }
    }

    if accepted.len() == 1 {
        Ok(accepted.remove(0))
    } else {
        Err(DetectionFailure::AmbiguousTopology)
    }
}

/// Assemble quad corners into a raster-ordered `rows x cols` corner grid.
pub fn assemble_grid(
    quads: &[Quad],
    rows: usize,
    cols: usize,
    params: &GridParams,
) -> Result<Vec<Point2<f64>>, DetectionFailure> {
    let expected = rows * cols;

    let candidates = merge_quad_corners(quads, params.merge_radius_px);
    log::debug!(
        "grid assembly: {} quads -> {} corner candidates (expect {})",
        quads.len(),
        candidates.len(),
        expected
    );
    if candidates.is_empty() {
        return Err(DetectionFailure::PatternNotFound);
    }
    if candidates.len() < expected {
        return Err(DetectionFailure::PartialGrid {
            found: candidates.len(),
            expected,
        });
    }

    let coords: Vec<[f64; 2]> = candidates.iter().map(|p| [p.x, p.y]).collect();
    let tree: KdTree<f64, 2> = (&coords).into();

    let axis_angle = dominant_axis_angle(&candidates, &tree);
    let spacing = median_spacing(&candidates, &tree);
    log::debug!(
        "grid assembly: axis angle {:.2} deg, spacing {:.2} px",
        axis_angle.to_degrees(),
        spacing
    );

    let lattice = build_lattice(&candidates, &tree, axis_angle, spacing, params);
    let mut components = connected_components(&lattice);
    components.sort_by_key(|c| std::cmp::Reverse(c.len()));

    let largest = &components[0];
    if largest.len() < expected {
        return Err(DetectionFailure::PartialGrid {
            found: largest.len(),
            expected,
        });
    }
    if largest.len() > expected {
        return Err(DetectionFailure::AmbiguousTopology);
    }

    let cells = occupancy_grid(largest, expected)?;
    canonical_raster(&cells, &candidates, rows, cols, spacing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    /// Dark squares of a board with `rows x cols` interior corners, square
    /// edge `s`, rotated by `angle` around the board origin. Interior corner
    /// `(c, r)` sits at lattice position `(c, r) * s` before rotation.
    fn board_quads(rows: usize, cols: usize, s: f64, angle: f64) -> Vec<Quad> {
        let rot = Rotation2::new(angle);
        let origin = Vector2::new(300.0, 300.0);
        let at = |x: f64, y: f64| Point2::from(origin + rot * Vector2::new(x * s, y * s));

        let mut quads = Vec::new();
        for j in 0..=rows {
            for i in 0..=cols {
                if (i + j) % 2 != 0 {
                    continue;
                }
                let (x0, y0) = (i as f64 - 1.0, j as f64 - 1.0);
                quads.push(Quad {
                    centroid: at(x0 + 0.5, y0 + 0.5),
                    area: (s * s) as usize,
                    corners: [
                        at(x0, y0),
                        at(x0 + 1.0, y0),
                        at(x0, y0 + 1.0),
                        at(x0 + 1.0, y0 + 1.0),
                    ],
                });
            }
        }
        quads
    }

    #[test]
    fn assembles_axis_aligned_board() {
        let (rows, cols, s) = (3, 4, 40.0);
        let quads = board_quads(rows, cols, s, 0.0);
        let points = assemble_grid(&quads, rows, cols, &GridParams::default()).unwrap();

        assert_eq!(points.len(), rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                let p = points[r * cols + c];
                assert_relative_eq!(p.x, 300.0 + c as f64 * s, epsilon = 1e-9);
                assert_relative_eq!(p.y, 300.0 + r as f64 * s, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn assembles_rotated_board_in_raster_order() {
        let (rows, cols, s) = (4, 6, 35.0);
        let quads = board_quads(rows, cols, s, 0.3);
        let points = assemble_grid(&quads, rows, cols, &GridParams::default()).unwrap();

        assert_eq!(points.len(), rows * cols);
        for r in 0..rows {
            for c in 1..cols {
                assert!(points[r * cols + c].x > points[r * cols + c - 1].x);
            }
        }
        for r in 1..rows {
            assert!(points[r * cols].y > points[(r - 1) * cols].y);
        }
    }

    #[test]
    fn quarter_turn_view_still_rasterizes() {
        let (rows, cols, s) = (3, 5, 40.0);
        let quads = board_quads(rows, cols, s, std::f64::consts::FRAC_PI_2);
        let points = assemble_grid(&quads, rows, cols, &GridParams::default()).unwrap();

        assert_eq!(points.len(), rows * cols);
        // Raster order is defined in the image frame regardless of how the
        // physical board was turned.
        assert!(points[1].x > points[0].x);
        assert!(points[cols].y > points[0].y);
    }

    #[test]
    fn missing_square_reports_partial_grid() {
        let (rows, cols, s) = (3, 4, 40.0);
        let mut quads = board_quads(rows, cols, s, 0.0);
        // Remove an interior dark square; its surrounding corners lose their
        // merge partners.
        let victim = quads
            .iter()
            .position(|q| {
                (q.centroid.x - (300.0 + 1.5 * s)).abs() < 1.0
                    && (q.centroid.y - (300.0 + 0.5 * s)).abs() < 1.0
            })
            .expect("interior quad present");
        quads.remove(victim);

        match assemble_grid(&quads, rows, cols, &GridParams::default()) {
            Err(DetectionFailure::PartialGrid { found, expected }) => {
                assert_eq!(expected, rows * cols);
                assert!(found < expected);
            }
            other => panic!("expected partial grid, got {other:?}"),
        }
    }

    #[test]
    fn no_quads_is_pattern_not_found() {
        let err = assemble_grid(&[], 3, 4, &GridParams::default()).unwrap_err();
        assert_eq!(err, DetectionFailure::PatternNotFound);
    }

    #[test]
    fn merge_drops_unpaired_corners() {
        let quads = board_quads(3, 4, 40.0, 0.0);
        let candidates = merge_quad_corners(&quads, 6.0);
        assert_eq!(candidates.len(), 12);
    }

    #[test]
    fn axis_angle_follows_board_rotation() {
        let quads = board_quads(4, 5, 40.0, 0.2);
        let candidates = merge_quad_corners(&quads, 6.0);
        let coords: Vec<[f64; 2]> = candidates.iter().map(|p| [p.x, p.y]).collect();
        let tree: KdTree<f64, 2> = (&coords).into();
        let angle = dominant_axis_angle(&candidates, &tree);
        assert_relative_eq!(angle, 0.2, epsilon = 0.05);
    }
}
