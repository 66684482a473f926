//! High-level facade for the `chess-calib-*` workspace.
//!
//! Estimates camera intrinsics, lens distortion and per-view board poses
//! from photographs of a planar chessboard: corners are detected per image,
//! a closed-form solution initializes the camera model, and a joint
//! nonlinear refinement minimizes reprojection error over all views.
//!
//! ## Quickstart
//!
//! ```no_run
//! use chess_calib::{gray_view, run_calibration, CalibrationConfig};
//! use chess_calib::core::PatternSpec;
//! use image::ImageReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut images = Vec::new();
//! for path in ["view0.png", "view1.png", "view2.png"] {
//!     images.push(ImageReader::open(path)?.decode()?.to_luma8());
//! }
//! let views: Vec<_> = images.iter().map(gray_view).collect();
//!
//! let config = CalibrationConfig::with_pattern(PatternSpec::new(7, 11, 24.0)?);
//! let result = run_calibration(&views, &config)?;
//! println!("{result}");
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `chess_calib::core`: images, pattern geometry, camera model, homography.
//! - `chess_calib::detect`: the chessboard interior-corner detector.
//! - `chess_calib::solve`: Zhang initialization and bundle refinement.
//! - [`pipeline`]: the batch pipeline with statuses and cancellation.
//! - [`synthetic`]: reproducible rendered/projected fixtures.
//! - [`image_io`] (feature `image`, default on): `image`-crate adapters and
//!   a detection overlay renderer.

pub use chess_calib_core as core;
pub use chess_calib_detect as detect;
pub use chess_calib_solve as solve;

pub use chess_calib_core::{CornerSet, Distortion, GrayImage, GrayImageView, Intrinsics, PatternSpec};
pub use chess_calib_detect::{ChessboardDetector, DetectionFailure, DetectorParams};
pub use chess_calib_solve::{SolveError, SolveOptions, SolveReport};

pub mod cancel;
pub mod config;
pub mod correspond;
pub mod pipeline;
pub mod result;
pub mod synthetic;
pub mod validate;

#[cfg(feature = "image")]
pub mod image_io;

pub use cancel::CancelToken;
pub use config::CalibrationConfig;
pub use correspond::Correspondences;
pub use pipeline::{run_calibration, run_calibration_cancellable, CalibrationError};
pub use result::{format_intrinsics, CalibrationResult, ViewPose, ViewStatus};

#[cfg(feature = "image")]
pub use image_io::{draw_corner_overlay, gray_image_from_slice, gray_view};
