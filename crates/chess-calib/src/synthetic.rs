//! Synthetic board views for tests, examples and benchmarking tuning.
//!
//! Everything here is a pure function of its inputs, so detector and solver
//! behavior on these fixtures is exactly reproducible.

use nalgebra::{Isometry3, Point2, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};

use chess_calib_core::{project_point, Distortion, GrayImage, Intrinsics, PatternSpec};

/// Board pose from Euler angles and a translation.
pub fn board_pose(rx: f64, ry: f64, rz: f64, tx: f64, ty: f64, tz: f64) -> Isometry3<f64> {
    Isometry3::from_parts(
        Translation3::new(tx, ty, tz),
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_euler_angles(rx, ry, rz)),
    )
}

/// Render a view of the board under the full camera model by tracing each
/// pixel's ray back onto the board plane `Z = 0`.
pub fn render_view(
    pattern: &PatternSpec,
    intrinsics: &Intrinsics,
    distortion: &Distortion,
    pose: &Isometry3<f64>,
    width: usize,
    height: usize,
) -> GrayImage {
    let s = pattern.square_size();
    let inv_pose = pose.inverse();

    GrayImage::from_fn(width, height, |x, y| {
        let n = intrinsics.pixel_to_normalized(Point2::new(x as f64, y as f64));
        let n = distortion.undistort(n, 20);
        let dir_cam = Vector3::new(n.x, n.y, 1.0);

        let origin_board = inv_pose.transform_point(&Point3::origin());
        let dir_board = inv_pose.rotation.transform_vector(&dir_cam);
        if dir_board.z.abs() < 1e-12 {
            return 220;
        }
        let t = -origin_board.z / dir_board.z;
        if t <= 0.0 {
            return 220;
        }
        let hit = origin_board + dir_board * t;

        // Board cells: interior corner (0, 0) sits at the board origin, the
        // cell left/above it is index 0.
        let i = (hit.x / s).floor() as i64 + 1;
        let j = (hit.y / s).floor() as i64 + 1;
        let on_board =
            i >= 0 && j >= 0 && i <= pattern.cols() as i64 && j <= pattern.rows() as i64;
        if on_board && (i + j) % 2 == 0 {
            30
        } else {
            220
        }
    })
}

/// Project all pattern corners for one pose. Panics if a corner lands
/// behind the camera, which never happens for sane fixture poses.
pub fn project_corners(
    pattern: &PatternSpec,
    intrinsics: &Intrinsics,
    distortion: &Distortion,
    pose: &Isometry3<f64>,
) -> Vec<Point2<f64>> {
    pattern
        .object_points()
        .iter()
        .map(|p| project_point(intrinsics, distortion, pose, p).expect("corner in view"))
        .collect()
}

/// Deterministic pseudo-noise in `[-sigma, sigma]`-ish (uniform scaled to
/// match `sigma` standard deviation), keyed by corner and view index. Keeps
/// noisy-scenario tests reproducible without a RNG dependency.
pub fn jitter(view: usize, corner: usize, axis: usize, sigma: f64) -> f64 {
    // SplitMix64 over a composed key.
    let mut z = (view as u64)
        .wrapping_mul(0x9e37_79b9_7f4a_7c15)
        .wrapping_add((corner as u64) << 20)
        .wrapping_add(axis as u64 + 1);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^= z >> 31;
    let uniform = (z >> 11) as f64 / (1u64 << 53) as f64; // [0, 1)
    (uniform * 2.0 - 1.0) * sigma * 3.0_f64.sqrt()
}
