//! Core types and utilities for chessboard camera calibration.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any concrete image decoder or detector; images enter as raw
//! row-major grayscale buffers and leave as numbers.

mod camera;
mod corner;
mod homography;
mod image;
mod logger;
mod pattern;

pub use camera::{project_point, Distortion, Intrinsics};
pub use corner::CornerSet;
pub use homography::{estimate_homography, Homography};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView};
pub use logger::init_with_level;
pub use pattern::{PatternSpec, PatternSpecError};
