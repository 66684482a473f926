//! Joint refinement of intrinsics, distortion and poses.
//!
//! Damped least squares over the stacked reprojection residuals of all
//! views. The Jacobian comes from forward differences; the normal equations
//! are solved with a Levenberg-style multiplicative damping on the diagonal.
//! Skew stays fixed at its closed-form estimate, and the distortion terms
//! selected by the options stay at zero.

use nalgebra::{DMatrix, DVector, Isometry3, Point2, Point3, Rotation3, Translation3, Vector3};

use chess_calib_core::{Distortion, Intrinsics};

use crate::{SolveError, SolveOptions};

/// Result of the refinement loop.
#[derive(Clone, Debug)]
pub struct RefineOutcome {
    pub intrinsics: Intrinsics,
    pub distortion: Distortion,
    pub poses: Vec<Isometry3<f64>>,
    pub iterations: usize,
    /// The relative cost decrease fell below the threshold. A stall (no
    /// downhill step at any damping) or hitting the iteration cap leaves
    /// this unset.
    pub converged: bool,
    /// RMS reprojection error at the accepted parameters, pixels.
    pub rms: f64,
}

struct Problem<'a> {
    object: &'a [Point3<f64>],
    observed: &'a [Vec<Point2<f64>>],
    skew: f64,
    fit_tangential: bool,
    fit_k3: bool,
}

impl Problem<'_> {
    fn intrinsic_param_count(&self) -> usize {
        6 + usize::from(self.fit_tangential) * 2 + usize::from(self.fit_k3)
    }

    fn param_count(&self) -> usize {
        self.intrinsic_param_count() + 6 * self.observed.len()
    }

    fn residual_count(&self) -> usize {
        2 * self.object.len() * self.observed.len()
    }

    fn pack(
        &self,
        intr: &Intrinsics,
        dist: &Distortion,
        poses: &[Isometry3<f64>],
    ) -> DVector<f64> {
        let mut p = DVector::zeros(self.param_count());
        p[0] = intr.fx;
        p[1] = intr.fy;
        p[2] = intr.cx;
        p[3] = intr.cy;
        p[4] = dist.k1;
        p[5] = dist.k2;
        let mut at = 6;
        if self.fit_tangential {
            p[at] = dist.p1;
            p[at + 1] = dist.p2;
            at += 2;
        }
        if self.fit_k3 {
            p[at] = dist.k3;
            at += 1;
        }
        for pose in poses {
            let aa = pose.rotation.scaled_axis();
            let t = pose.translation.vector;
            p[at] = aa.x;
            p[at + 1] = aa.y;
            p[at + 2] = aa.z;
            p[at + 3] = t.x;
            p[at + 4] = t.y;
            p[at + 5] = t.z;
            at += 6;
        }
        p
    }

    fn unpack(&self, p: &DVector<f64>) -> (Intrinsics, Distortion, Vec<Isometry3<f64>>) {
        let intr = Intrinsics {
            fx: p[0],
            fy: p[1],
            cx: p[2],
            cy: p[3],
            skew: self.skew,
        };
        let mut dist = Distortion {
            k1: p[4],
            k2: p[5],
            ..Distortion::default()
        };
        let mut at = 6;
        if self.fit_tangential {
            dist.p1 = p[at];
            dist.p2 = p[at + 1];
            at += 2;
        }
        if self.fit_k3 {
            dist.k3 = p[at];
            at += 1;
        }

        let mut poses = Vec::with_capacity(self.observed.len());
        for _ in 0..self.observed.len() {
            let aa = Vector3::new(p[at], p[at + 1], p[at + 2]);
            let t = Vector3::new(p[at + 3], p[at + 4], p[at + 5]);
            poses.push(Isometry3::from_parts(
                Translation3::from(t),
                Rotation3::new(aa).into(),
            ));
            at += 6;
        }
        (intr, dist, poses)
    }

    fn residuals(&self, p: &DVector<f64>) -> DVector<f64> {
        let (intr, dist, poses) = self.unpack(p);
        let mut r = DVector::zeros(self.residual_count());
        let mut at = 0;
        for (pose, observed) in poses.iter().zip(self.observed) {
            for (obj, obs) in self.object.iter().zip(observed) {
                let pc = pose.transform_point(obj);
                if pc.z > 1e-9 {
                    let n = nalgebra::Vector2::new(pc.x / pc.z, pc.y / pc.z);
                    let uv = intr.normalized_to_pixel(dist.distort(n));
                    r[at] = uv.x - obs.x;
                    r[at + 1] = uv.y - obs.y;
                } else {
                    // A point swung behind the camera; penalize hard so the
                    // step gets rejected.
                    r[at] = 1e4;
                    r[at + 1] = 1e4;
                }
                at += 2;
            }
        }
        r
    }

    fn jacobian(&self, p: &DVector<f64>, r0: &DVector<f64>) -> DMatrix<f64> {
        let n = self.param_count();
        let mut jac = DMatrix::zeros(self.residual_count(), n);
        let mut probe = p.clone();
        for col in 0..n {
            let step = 1e-6 * p[col].abs().max(1.0);
            probe[col] = p[col] + step;
            let r1 = self.residuals(&probe);
            probe[col] = p[col];
            let d = (r1 - r0) / step;
            jac.set_column(col, &d);
        }
        jac
    }
}

#[allow(clippy::too_many_arguments)]
pub fn refine(
    object: &[Point3<f64>],
    observed: &[Vec<Point2<f64>>],
    intrinsics: Intrinsics,
    distortion: Distortion,
    poses: Vec<Isometry3<f64>>,
    options: &SolveOptions,
    cancelled: &dyn Fn() -> bool,
) -> Result<RefineOutcome, SolveError> {
    let problem = Problem {
        object,
        observed,
        skew: intrinsics.skew,
        fit_tangential: !options.fix_tangential,
        fit_k3: !options.fix_k3,
    };

    let mut params = problem.pack(&intrinsics, &distortion, &poses);
    let mut residuals = problem.residuals(&params);
    let mut cost = residuals.norm_squared();
    let mut damping = 1e-3;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < options.max_iterations {
        if cancelled() {
            return Err(SolveError::Cancelled);
        }
        iterations += 1;

        let jac = problem.jacobian(&params, &residuals);
        let jtj = jac.transpose() * &jac;
        let jtr = jac.transpose() * &residuals;

        let mut accepted = false;
        for _ in 0..10 {
            let mut lhs = jtj.clone();
            for i in 0..lhs.nrows() {
                lhs[(i, i)] += damping * jtj[(i, i)].max(1e-12);
            }

            let Some(chol) = lhs.cholesky() else {
                damping *= 10.0;
                continue;
            };
            let delta = chol.solve(&(-&jtr));
            let trial = &params + &delta;
            let trial_residuals = problem.residuals(&trial);
            let trial_cost = trial_residuals.norm_squared();

            if trial_cost < cost {
                let relative_drop = (cost - trial_cost) / cost.max(1e-300);
                params = trial;
                residuals = trial_residuals;
                cost = trial_cost;
                damping = (damping * 0.1).max(1e-12);
                accepted = true;
                if relative_drop < options.convergence_threshold {
                    converged = true;
                }
                break;
            }
            damping *= 10.0;
            if damping > 1e12 {
                break;
            }
        }

        if !accepted {
            // Stalled: no damping level produced a downhill step. The
            // convergence criterion was not met, so report it as such.
            log::debug!("refinement stalled after {iterations} iterations");
            break;
        }
        if converged {
            break;
        }
    }

    let (intrinsics, distortion, poses) = problem.unpack(&params);
    let rms = (cost / problem.residual_count() as f64).sqrt();
    log::debug!(
        "refinement finished after {iterations} iterations, rms {rms:.4} px, converged: {converged}"
    );

    Ok(RefineOutcome {
        intrinsics,
        distortion,
        poses,
        iterations,
        converged,
        rms,
    })
}
