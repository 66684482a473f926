//! Plausibility checks on a solved calibration.
//!
//! The solver can converge to a numerically fine but physically absurd
//! optimum when the input views are poor. These checks catch the common
//! cases; in lenient mode they only downgrade the result's confidence.

use chess_calib_core::Intrinsics;

use crate::config::CalibrationConfig;

/// Findings are plain strings so they can be surfaced verbatim in errors,
/// warnings and logs.
pub fn validate_intrinsics(
    intrinsics: &Intrinsics,
    image_width: usize,
    image_height: usize,
    mean_reproj_error: f64,
    config: &CalibrationConfig,
) -> Vec<String> {
    let mut reasons = Vec::new();

    if !intrinsics.fx.is_finite() || intrinsics.fx <= 0.0 {
        reasons.push(format!("focal length fx = {:.2} is not positive", intrinsics.fx));
    }
    if !intrinsics.fy.is_finite() || intrinsics.fy <= 0.0 {
        reasons.push(format!("focal length fy = {:.2} is not positive", intrinsics.fy));
    }

    // The principal point of a real lens sits near the image center; allow
    // half an image dimension of slack beyond the bounds.
    let margin_x = image_width as f64 * 0.5;
    let margin_y = image_height as f64 * 0.5;
    if !intrinsics.cx.is_finite()
        || intrinsics.cx < -margin_x
        || intrinsics.cx > image_width as f64 + margin_x
    {
        reasons.push(format!(
            "principal point cx = {:.2} is far outside the {}px wide image",
            intrinsics.cx, image_width
        ));
    }
    if !intrinsics.cy.is_finite()
        || intrinsics.cy < -margin_y
        || intrinsics.cy > image_height as f64 + margin_y
    {
        reasons.push(format!(
            "principal point cy = {:.2} is far outside the {}px tall image",
            intrinsics.cy, image_height
        ));
    }

    if !mean_reproj_error.is_finite() || mean_reproj_error > config.max_reproj_error {
        reasons.push(format!(
            "mean reprojection error {:.4} px exceeds the {:.4} px limit",
            mean_reproj_error, config.max_reproj_error
        ));
    }

    reasons
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_intrinsics() -> Intrinsics {
        Intrinsics {
            fx: 800.0,
            fy: 780.0,
            cx: 320.0,
            cy: 240.0,
            skew: 0.0,
        }
    }

    #[test]
    fn clean_result_passes() {
        let reasons = validate_intrinsics(
            &good_intrinsics(),
            640,
            480,
            0.2,
            &CalibrationConfig::default(),
        );
        assert!(reasons.is_empty(), "{reasons:?}");
    }

    #[test]
    fn negative_focal_length_is_flagged() {
        let intr = Intrinsics {
            fx: -5.0,
            ..good_intrinsics()
        };
        let reasons =
            validate_intrinsics(&intr, 640, 480, 0.2, &CalibrationConfig::default());
        assert!(reasons.iter().any(|r| r.contains("fx")));
    }

    #[test]
    fn runaway_principal_point_is_flagged() {
        let intr = Intrinsics {
            cx: 5000.0,
            ..good_intrinsics()
        };
        let reasons =
            validate_intrinsics(&intr, 640, 480, 0.2, &CalibrationConfig::default());
        assert!(reasons.iter().any(|r| r.contains("cx")));
    }

    #[test]
    fn large_reprojection_error_is_flagged() {
        let reasons = validate_intrinsics(
            &good_intrinsics(),
            640,
            480,
            3.5,
            &CalibrationConfig::default(),
        );
        assert!(reasons.iter().any(|r| r.contains("reprojection")));
    }
}
