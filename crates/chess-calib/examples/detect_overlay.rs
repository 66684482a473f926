//! Detect corners in one rendered view and write an overlay image next to
//! the current directory, useful for eyeballing detector behavior.

use chess_calib::core::{init_with_level, Distortion, Intrinsics, PatternSpec};
use chess_calib::synthetic::{board_pose, render_view};
use chess_calib::{draw_corner_overlay, gray_image_from_slice, ChessboardDetector};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_with_level(log::LevelFilter::Debug)?;

    let pattern = PatternSpec::new(4, 6, 30.0)?;
    let intrinsics = Intrinsics {
        fx: 600.0,
        fy: 600.0,
        cx: 320.0,
        cy: 240.0,
        skew: 0.0,
    };
    let pose = board_pose(0.15, -0.1, 0.08, -80.0, -50.0, 540.0);
    let rendered = render_view(&pattern, &intrinsics, &Distortion::default(), &pose, 640, 480);

    let detector = ChessboardDetector::with_defaults(pattern);
    let corners = detector.detect(&rendered.view())?;
    log::info!("detected {} corners", corners.len());

    let img = gray_image_from_slice(
        rendered.width as u32,
        rendered.height as u32,
        &rendered.data,
    )?;
    let overlay = draw_corner_overlay(&img, &corners);
    overlay.save("detect_overlay.png")?;
    println!("wrote detect_overlay.png");
    Ok(())
}
