//! Closed-form intrinsics from plane homographies.
//!
//! Each homography `H = K [r1 r2 t]` constrains the image of the absolute
//! conic `B = K^-T K^-1` through the orthonormality of `r1`, `r2`. Stacking
//! two linear constraints per view and solving `V b = 0` by SVD recovers `B`
//! up to scale, from which `K` follows in closed form.

use nalgebra::{DMatrix, Matrix3, SVector};

use chess_calib_core::Intrinsics;

use crate::SolveError;

/// The 6-vector `v_ij(H)` of Zhang's constraint system, with 0-based column
/// indices.
fn v_ij(h: &Matrix3<f64>, i: usize, j: usize) -> SVector<f64, 6> {
    let hi = h.column(i);
    let hj = h.column(j);

    SVector::<f64, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Estimate `K` from at least two plane homographies.
///
/// Two views give only four constraints for the five unknowns of `B`, so
/// for fewer than three views an explicit zero-skew row (`B12 = 0`) is
/// appended, which matches the behavior of the refinement stage where skew
/// stays fixed.
pub fn intrinsics_from_homographies(hs: &[Matrix3<f64>]) -> Result<Intrinsics, SolveError> {
    if hs.len() < 2 {
        return Err(SolveError::NotEnoughViews {
            got: hs.len(),
            needed: 2,
        });
    }

    let zero_skew_row = hs.len() < 3;
    let rows = 2 * hs.len() + usize::from(zero_skew_row);
    let mut vmtx = DMatrix::<f64>::zeros(rows, 6);

    for (k, h) in hs.iter().enumerate() {
        let v11 = v_ij(h, 0, 0);
        let v22 = v_ij(h, 1, 1);
        let v12 = v_ij(h, 0, 1);

        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }
    if zero_skew_row {
        vmtx[(rows - 1, 1)] = 1.0;
    }

    // b spans the null space of V: the right singular vector with the
    // smallest singular value.
    let svd = vmtx.svd(true, true);
    let v_t = svd
        .v_t
        .ok_or(SolveError::DegenerateGeometry("SVD of constraint matrix failed"))?;
    let b = v_t.row(v_t.nrows() - 1);

    let b11 = b[0];
    let b12 = b[1];
    let b22 = b[2];
    let b13 = b[3];
    let b23 = b[4];
    let b33 = b[5];

    // Closed form:
    //
    // v0 = (B12 B13 - B11 B23) / (B11 B22 - B12^2)
    // λ  = B33 - (B13^2 + v0 (B12 B13 - B11 B23)) / B11
    // α  = sqrt(λ / B11)
    // β  = sqrt(λ B11 / (B11 B22 - B12^2))
    // γ  = -B12 α^2 β / λ
    // u0 = γ v0 / β - B13 α^2 / λ

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm <= 1e-6 {
        return Err(SolveError::DegenerateGeometry(
            "conic matrix is rank deficient; views are too similar or near fronto-parallel",
        ));
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda.signum() != b11.signum() || lambda / b11 <= 0.0 || lambda * b11 / denom <= 0.0 {
        return Err(SolveError::DegenerateGeometry(
            "conic solution is not positive definite",
        ));
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    Ok(Intrinsics {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
        skew: gamma,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_support::{homography_for_pose, test_intrinsics};
    use nalgebra::{Rotation3, Vector3};

    #[test]
    fn recovers_k_from_three_views() {
        let intr = test_intrinsics();
        let hs = vec![
            homography_for_pose(
                &intr,
                Rotation3::from_euler_angles(0.1, 0.0, 0.05),
                Vector3::new(0.1, -0.05, 1.0),
            ),
            homography_for_pose(
                &intr,
                Rotation3::from_euler_angles(-0.05, 0.15, -0.1),
                Vector3::new(-0.05, 0.1, 1.2),
            ),
            homography_for_pose(
                &intr,
                Rotation3::from_euler_angles(0.2, -0.1, 0.0),
                Vector3::new(0.0, 0.0, 0.9),
            ),
        ];

        let est = intrinsics_from_homographies(&hs).unwrap();
        assert!((est.fx - intr.fx).abs() < 1e-6 * intr.fx);
        assert!((est.fy - intr.fy).abs() < 1e-6 * intr.fy);
        assert!((est.cx - intr.cx).abs() < 1e-4);
        assert!((est.cy - intr.cy).abs() < 1e-4);
        assert!(est.skew.abs() < 1e-6);
    }

    #[test]
    fn two_views_work_with_zero_skew_constraint() {
        let intr = test_intrinsics();
        let hs = vec![
            homography_for_pose(
                &intr,
                Rotation3::from_euler_angles(0.25, 0.1, 0.0),
                Vector3::new(0.1, 0.0, 1.0),
            ),
            homography_for_pose(
                &intr,
                Rotation3::from_euler_angles(-0.1, -0.3, 0.1),
                Vector3::new(-0.1, 0.05, 1.3),
            ),
        ];

        let est = intrinsics_from_homographies(&hs).unwrap();
        assert!((est.fx - intr.fx).abs() < 1e-3 * intr.fx);
        assert!((est.fy - intr.fy).abs() < 1e-3 * intr.fy);
    }

    #[test]
    fn fronto_parallel_views_are_rejected() {
        // Face-on views differ only by translation, so every view yields the
        // same two constraint rows and the conic system stays rank deficient.
        let intr = test_intrinsics();
        let translations = [
            Vector3::new(0.1, 0.0, 1.0),
            Vector3::new(-0.05, 0.1, 1.2),
            Vector3::new(0.0, -0.1, 0.9),
            Vector3::new(0.08, 0.06, 1.1),
        ];
        let hs: Vec<_> = translations
            .iter()
            .map(|t| homography_for_pose(&intr, Rotation3::identity(), *t))
            .collect();

        assert!(matches!(
            intrinsics_from_homographies(&hs),
            Err(SolveError::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn one_view_is_not_enough() {
        let intr = test_intrinsics();
        let hs = vec![homography_for_pose(
            &intr,
            Rotation3::from_euler_angles(0.1, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        )];
        assert!(matches!(
            intrinsics_from_homographies(&hs),
            Err(SolveError::NotEnoughViews { got: 1, needed: 2 })
        ));
    }
}
