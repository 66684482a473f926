//! Interop with the `image` crate: buffer adaptation and a corner overlay
//! renderer for visual inspection of detections.

use thiserror::Error;

use chess_calib_core::{CornerSet, GrayImageView};

/// Invalid raw grayscale buffer.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GrayBufferError {
    #[error("invalid grayscale buffer length (expected {expected} bytes, got {got})")]
    InvalidLength { expected: usize, got: usize },
    #[error("invalid grayscale dimensions (width={width}, height={height})")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Borrow an `image::GrayImage` as the lightweight core view type.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Build an `image::GrayImage` from a raw row-major grayscale buffer.
pub fn gray_image_from_slice(
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Result<::image::GrayImage, GrayBufferError> {
    let expected = (width as usize)
        .checked_mul(height as usize)
        .ok_or(GrayBufferError::InvalidDimensions { width, height })?;
    if pixels.len() != expected {
        return Err(GrayBufferError::InvalidLength {
            expected,
            got: pixels.len(),
        });
    }
    ::image::GrayImage::from_raw(width, height, pixels.to_vec())
        .ok_or(GrayBufferError::InvalidDimensions { width, height })
}

fn put_pixel_checked(img: &mut ::image::RgbImage, x: i64, y: i64, color: ::image::Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_line(
    img: &mut ::image::RgbImage,
    from: (f64, f64),
    to: (f64, f64),
    color: ::image::Rgb<u8>,
) {
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as usize;
    for k in 0..=steps {
        let t = k as f64 / steps as f64;
        put_pixel_checked(
            img,
            (from.0 + t * dx).round() as i64,
            (from.1 + t * dy).round() as i64,
            color,
        );
    }
}

fn draw_cross(img: &mut ::image::RgbImage, at: (f64, f64), arm: i64, color: ::image::Rgb<u8>) {
    let (x, y) = (at.0.round() as i64, at.1.round() as i64);
    for d in -arm..=arm {
        put_pixel_checked(img, x + d, y, color);
        put_pixel_checked(img, x, y + d, color);
    }
}

/// Render the detected grid onto a copy of the source image: a cross per
/// corner and a polyline following the raster order, with the first corner
/// highlighted so the orientation is visible.
pub fn draw_corner_overlay(src: &::image::GrayImage, corners: &CornerSet) -> ::image::RgbImage {
    let mut out = ::image::RgbImage::from_fn(src.width(), src.height(), |x, y| {
        let v = src.get_pixel(x, y)[0];
        ::image::Rgb([v, v, v])
    });

    let line = ::image::Rgb([60, 200, 60]);
    let cross = ::image::Rgb([220, 60, 60]);
    let first = ::image::Rgb([60, 60, 220]);

    let pts = corners.points();
    for pair in pts.windows(2) {
        draw_line(
            &mut out,
            (pair[0].x, pair[0].y),
            (pair[1].x, pair[1].y),
            line,
        );
    }
    for p in pts {
        draw_cross(&mut out, (p.x, p.y), 3, cross);
    }
    if let Some(p) = pts.first() {
        draw_cross(&mut out, (p.x, p.y), 5, first);
    }
    out
}
