//! Pose initialization from a homography and known intrinsics.
//!
//! For a board on its own `Z = 0` plane, `H = K [r1 r2 t]` up to scale, so
//! `K^-1 H` yields the first two rotation columns and the translation. The
//! rebuilt rotation is projected onto SO(3) to absorb noise.

use nalgebra::{Isometry3, Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};

use crate::SolveError;

/// Decompose `H` into the pose mapping board coordinates into the camera
/// frame.
pub fn pose_from_homography(
    k: &Matrix3<f64>,
    h: &Matrix3<f64>,
) -> Result<Isometry3<f64>, SolveError> {
    let k_inv = k
        .try_inverse()
        .ok_or(SolveError::DegenerateGeometry("camera matrix is singular"))?;

    let a1 = k_inv * h.column(0);
    let a2 = k_inv * h.column(1);
    let a3 = k_inv * h.column(2);

    let norm1 = a1.norm();
    let norm2 = a2.norm();
    if norm1 < 1e-12 || norm2 < 1e-12 {
        return Err(SolveError::DegenerateGeometry(
            "homography has a vanishing rotation column",
        ));
    }

    // The two columns share one scale in theory; averaging splits the noise.
    let lambda = 1.0 / ((norm1 + norm2) * 0.5);

    let r1 = lambda * a1;
    let r2 = lambda * a2;
    let r3 = r1.cross(&r2);

    let mut r_mat = Matrix3::<f64>::zeros();
    r_mat.set_column(0, &r1);
    r_mat.set_column(1, &r2);
    r_mat.set_column(2, &r3);

    // Nearest rotation in the Frobenius sense.
    let svd = r_mat.svd(true, true);
    let u = svd
        .u
        .ok_or(SolveError::DegenerateGeometry("SVD of rotation estimate failed"))?;
    let v_t = svd
        .v_t
        .ok_or(SolveError::DegenerateGeometry("SVD of rotation estimate failed"))?;

    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let mut t_vec: Vector3<f64> = lambda * a3;
    if t_vec.z < 0.0 {
        // The board must be in front of the camera; the homography scale
        // sign is arbitrary.
        t_vec = -t_vec;
        r_orth.column_mut(0).neg_mut();
        r_orth.column_mut(1).neg_mut();
    }

    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Ok(Isometry3::from_parts(Translation3::from(t_vec), rot))
}
