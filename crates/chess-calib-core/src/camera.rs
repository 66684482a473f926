use nalgebra::{Isometry3, Matrix3, Point2, Point3, Vector2};
use serde::{Deserialize, Serialize};

/// Pinhole intrinsics mapping normalized camera-plane coordinates to pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    /// Focal length in pixels along X.
    pub fx: f64,
    /// Focal length in pixels along Y.
    pub fy: f64,
    /// Principal point X coordinate in pixels.
    pub cx: f64,
    /// Principal point Y coordinate in pixels.
    pub cy: f64,
    /// Skew term (typically 0).
    pub skew: f64,
}

impl Intrinsics {
    /// The 3x3 camera matrix K.
    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, self.skew, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    #[inline]
    pub fn normalized_to_pixel(&self, n: Vector2<f64>) -> Point2<f64> {
        Point2::new(
            self.fx * n.x + self.skew * n.y + self.cx,
            self.fy * n.y + self.cy,
        )
    }

    #[inline]
    pub fn pixel_to_normalized(&self, p: Point2<f64>) -> Vector2<f64> {
        let ny = (p.y - self.cy) / self.fy;
        let nx = (p.x - self.cx - self.skew * ny) / self.fx;
        Vector2::new(nx, ny)
    }
}

/// Brown-Conrady lens distortion: radial k1, k2, k3 and tangential p1, p2,
/// applied to normalized coordinates before the intrinsic matrix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub k3: f64,
    pub p1: f64,
    pub p2: f64,
}

impl Distortion {
    #[inline]
    pub fn distort(&self, n: Vector2<f64>) -> Vector2<f64> {
        let x = n.x;
        let y = n.y;
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;

        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;

        Vector2::new(x * radial + x_tan, y * radial + y_tan)
    }

    /// Invert [`distort`](Self::distort) by fixed-point iteration; exact in
    /// the limit for small-to-moderate distortion.
    pub fn undistort(&self, n_dist: Vector2<f64>, iters: u32) -> Vector2<f64> {
        let mut n = n_dist;
        for _ in 0..iters.max(1) {
            let err = self.distort(n) - n_dist;
            n -= err;
        }
        n
    }
}

/// Project a board-frame point through pose, distortion and intrinsics.
///
/// `cam_from_board` maps board coordinates into the camera frame; points at
/// or behind the camera plane (z <= 0) are not projectable.
pub fn project_point(
    intrinsics: &Intrinsics,
    distortion: &Distortion,
    cam_from_board: &Isometry3<f64>,
    p_board: &Point3<f64>,
) -> Option<Point2<f64>> {
    let pc = cam_from_board.transform_point(p_board);
    if pc.z <= 1e-12 {
        return None;
    }
    let n = Vector2::new(pc.x / pc.z, pc.y / pc.z);
    let nd = distortion.distort(n);
    Some(intrinsics.normalized_to_pixel(nd))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Translation3, UnitQuaternion};

    fn test_intrinsics() -> Intrinsics {
        Intrinsics {
            fx: 800.0,
            fy: 780.0,
            cx: 320.0,
            cy: 240.0,
            skew: 0.0,
        }
    }

    #[test]
    fn pixel_round_trip() {
        let k = test_intrinsics();
        let n = Vector2::new(0.12, -0.07);
        let p = k.normalized_to_pixel(n);
        let back = k.pixel_to_normalized(p);
        assert_relative_eq!(back.x, n.x, epsilon = 1e-12);
        assert_relative_eq!(back.y, n.y, epsilon = 1e-12);
    }

    #[test]
    fn undistort_inverts_distort() {
        let d = Distortion {
            k1: -0.2,
            k2: 0.05,
            k3: 0.0,
            p1: 0.001,
            p2: -0.0005,
        };
        let n = Vector2::new(0.3, -0.2);
        let nd = d.distort(n);
        let back = d.undistort(nd, 12);
        assert_relative_eq!(back.x, n.x, epsilon = 1e-9);
        assert_relative_eq!(back.y, n.y, epsilon = 1e-9);
    }

    #[test]
    fn projects_centered_point_to_principal_point() {
        let k = test_intrinsics();
        let d = Distortion::default();
        let pose = Isometry3::from_parts(
            Translation3::new(0.0, 0.0, 100.0),
            UnitQuaternion::identity(),
        );
        let uv = project_point(&k, &d, &pose, &Point3::origin()).unwrap();
        assert_relative_eq!(uv.x, k.cx, epsilon = 1e-12);
        assert_relative_eq!(uv.y, k.cy, epsilon = 1e-12);
    }

    #[test]
    fn camera_model_round_trips_through_json() {
        let k = test_intrinsics();
        let d = Distortion {
            k1: -0.2,
            k2: 0.05,
            k3: 0.0,
            p1: 0.001,
            p2: -0.0005,
        };
        let json = serde_json::to_string(&(k, d)).unwrap();
        let (k2, d2): (Intrinsics, Distortion) = serde_json::from_str(&json).unwrap();
        assert_eq!(k2, k);
        assert_eq!(d2, d);
    }

    #[test]
    fn rejects_points_behind_camera() {
        let k = test_intrinsics();
        let d = Distortion::default();
        let pose = Isometry3::from_parts(
            Translation3::new(0.0, 0.0, -10.0),
            UnitQuaternion::identity(),
        );
        assert!(project_point(&k, &d, &pose, &Point3::origin()).is_none());
    }
}
