//! Adaptive local-mean thresholding.
//!
//! Segments the board into dark squares without assuming global contrast:
//! a pixel is dark when it lies below the mean of its neighborhood by more
//! than a bias. The neighborhood mean comes from an integral image, so the
//! cost is independent of the window size.

use chess_calib_core::GrayImageView;

/// Binary mask with the layout of the source image; `true` marks dark pixels.
#[derive(Clone, Debug)]
pub struct BinaryMask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<bool>,
}

impl BinaryMask {
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x]
    }
}

/// Summed-area table with one guard row/column: `sums[(y+1)*(w+1) + (x+1)]`
/// holds the sum of all pixels in `[0..=x, 0..=y]`.
fn integral_image(src: &GrayImageView<'_>) -> Vec<u64> {
    let w = src.width;
    let h = src.height;
    let stride = w + 1;
    let mut sums = vec![0u64; stride * (h + 1)];

    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            row_sum += src.get(x, y) as u64;
            sums[(y + 1) * stride + (x + 1)] = sums[y * stride + (x + 1)] + row_sum;
        }
    }
    sums
}

#[inline]
fn window_mean(sums: &[u64], stride: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
    // Inclusive window [x0..=x1, y0..=y1] in pixel coordinates.
    let a = sums[y0 * stride + x0];
    let b = sums[y0 * stride + (x1 + 1)];
    let c = sums[(y1 + 1) * stride + x0];
    let d = sums[(y1 + 1) * stride + (x1 + 1)];
    let total = (d + a) as f64 - (b + c) as f64;
    let count = ((x1 + 1 - x0) * (y1 + 1 - y0)) as f64;
    total / count
}

/// Threshold against the local mean: dark when `pixel < mean - bias`.
///
/// `window_radius = 0` picks a radius from the image size (about a tenth of
/// the smaller dimension), which comfortably spans a board square.
pub fn adaptive_threshold(src: &GrayImageView<'_>, window_radius: usize, bias: f64) -> BinaryMask {
    let w = src.width;
    let h = src.height;
    let radius = if window_radius == 0 {
        (w.min(h) / 10).max(3)
    } else {
        window_radius
    };

    let sums = integral_image(src);
    let stride = w + 1;
    let mut data = vec![false; w * h];

    for y in 0..h {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius).min(h - 1);
        for x in 0..w {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius).min(w - 1);
            let mean = window_mean(&sums, stride, x0, y0, x1, y1);
            data[y * w + x] = (src.get(x, y) as f64) < mean - bias;
        }
    }

    BinaryMask {
        width: w,
        height: h,
        data,
    }
}

/// 3x3 erosion; separates quads that touch only at a corner after
/// thresholding, so connected-component labeling keeps them apart.
pub fn erode(mask: &BinaryMask) -> BinaryMask {
    let w = mask.width;
    let h = mask.height;
    let mut data = vec![false; w * h];

    for y in 1..h.saturating_sub(1) {
        for x in 1..w.saturating_sub(1) {
            let mut keep = true;
            'window: for dy in 0..3 {
                for dx in 0..3 {
                    if !mask.get(x + dx - 1, y + dy - 1) {
                        keep = false;
                        break 'window;
                    }
                }
            }
            data[y * w + x] = keep;
        }
    }

    BinaryMask {
        width: w,
        height: h,
        data,
    }
}
