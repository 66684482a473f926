//! Sub-pixel corner refinement.
//!
//! A chessboard corner is the intersection of two high-gradient edges, so
//! the gradient-magnitude-weighted centroid of a small window converges onto
//! the saddle point. Each corner iterates independently until the update
//! falls below `eps` or the iteration cap is reached.

use chess_calib_core::GrayImageView;
use nalgebra::Point2;

/// Refinement window and convergence settings.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct SubpixelParams {
    /// Half-width of the square window around the current estimate.
    pub win_radius: usize,
    pub max_iters: usize,
    /// Stop once the position update is below this many pixels.
    pub eps: f64,
}

impl Default for SubpixelParams {
    fn default() -> Self {
        Self {
            win_radius: 4,
            max_iters: 30,
            eps: 1e-3,
        }
    }
}

fn refine_one(src: &GrayImageView<'_>, p: Point2<f64>, params: &SubpixelParams) -> Point2<f64> {
    let w = src.width as i64;
    let h = src.height as i64;
    let r = params.win_radius as i64;

    let mut x = p.x;
    let mut y = p.y;
    for _ in 0..params.max_iters {
        let cx = x.round() as i64;
        let cy = y.round() as i64;

        let mut sw = 0.0;
        let mut sx = 0.0;
        let mut sy = 0.0;
        for dy in -r..=r {
            for dx in -r..=r {
                let xx = cx + dx;
                let yy = cy + dy;
                if xx <= 0 || yy <= 0 || xx >= w - 1 || yy >= h - 1 {
                    continue;
                }
                let (xu, yu) = (xx as usize, yy as usize);
                let gx = (src.get(xu + 1, yu) as f64 - src.get(xu - 1, yu) as f64) * 0.5;
                let gy = (src.get(xu, yu + 1) as f64 - src.get(xu, yu - 1) as f64) * 0.5;
                let weight = (gx * gx + gy * gy).sqrt();
                if weight <= 1e-9 {
                    continue;
                }
                sw += weight;
                sx += weight * xx as f64;
                sy += weight * yy as f64;
            }
        }
        if sw <= 1e-9 {
            break;
        }

        let nx = sx / sw;
        let ny = sy / sw;
        let shift = ((nx - x).powi(2) + (ny - y).powi(2)).sqrt();
        x = nx;
        y = ny;
        if shift < params.eps {
            break;
        }
    }

    Point2::new(
        x.clamp(0.0, (src.width - 1) as f64),
        y.clamp(0.0, (src.height - 1) as f64),
    )
}

/// Refine every corner in place.
pub fn refine_corners(
    src: &GrayImageView<'_>,
    corners: &mut [Point2<f64>],
    params: &SubpixelParams,
) {
    for corner in corners.iter_mut() {
        *corner = refine_one(src, *corner, params);
    }
}
