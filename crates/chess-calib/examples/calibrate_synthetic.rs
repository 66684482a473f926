//! Calibrate against rendered synthetic photographs of a chessboard and
//! print the recovered camera model.
//!
//! Run with `RUST_LOG=debug` for per-stage pipeline logging.

use chess_calib::core::{Distortion, Intrinsics, PatternSpec};
use chess_calib::synthetic::{board_pose, render_view};
use chess_calib::{run_calibration, CalibrationConfig};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let pattern = PatternSpec::new(4, 6, 30.0)?;
    let ground_truth = Intrinsics {
        fx: 600.0,
        fy: 600.0,
        cx: 320.0,
        cy: 240.0,
        skew: 0.0,
    };

    let poses = [
        board_pose(0.15, 0.1, 0.05, -80.0, -50.0, 520.0),
        board_pose(-0.2, 0.15, -0.08, -70.0, -40.0, 560.0),
        board_pose(0.1, -0.22, 0.1, -85.0, -55.0, 500.0),
        board_pose(0.25, 0.05, 0.0, -75.0, -45.0, 600.0),
        board_pose(-0.1, -0.15, -0.12, -90.0, -40.0, 540.0),
    ];

    log::info!("rendering {} synthetic views", poses.len());
    let images: Vec<_> = poses
        .iter()
        .map(|pose| {
            render_view(
                &pattern,
                &ground_truth,
                &Distortion::default(),
                pose,
                640,
                480,
            )
        })
        .collect();
    let views: Vec<_> = images.iter().map(|i| i.view()).collect();

    let config = CalibrationConfig::with_pattern(pattern);
    let result = run_calibration(&views, &config)?;

    println!("{result}");
    println!(
        "ground truth: fx {:.1} fy {:.1} cx {:.1} cy {:.1}",
        ground_truth.fx, ground_truth.fy, ground_truth.cx, ground_truth.cy
    );
    Ok(())
}
