//! Geometric normalization of raw sensor frames.
//!
//! Raw frames arrive at whatever resolution the device delivers; every
//! downstream stage expects the canonical (imgw, imgh) geometry with the
//! vignetted sensor-housing border removed.

use opencv::core::{Mat, Rect, Size};
use opencv::imgproc;
use opencv::prelude::*;

use crate::config::Config;

/// Intermediate resolution that preserves the physical aspect ratio of the
/// sensing surface before the border crop.
const INTER_W: i32 = 895;
const INTER_H: i32 = 672;
/// Fraction of each spanwise dimension cropped from both sides.
const BORDER_FRACTION: f64 = 1.0 / 7.0;

/// Crop and resize a raw frame to the canonical working resolution.
///
/// Resize to the fixed intermediate resolution, cut the fractional border,
/// drop one trailing column to land on a standard pixel count, then resize
/// to (imgw, imgh). The output size is exact regardless of input size.
pub fn normalize_frame(raw: &Mat, config: &Config) -> anyhow::Result<Mat> {
    let mut inter = Mat::default();
    imgproc::resize(
        raw,
        &mut inter,
        Size::new(INTER_W, INTER_H),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let border_y = (INTER_H as f64 * BORDER_FRACTION) as i32;
    let border_x = (INTER_W as f64 * BORDER_FRACTION) as i32;
    // one extra column off the right edge lands on a standard width
    let roi = Rect::new(
        border_x,
        border_y,
        INTER_W - 2 * border_x - 1,
        INTER_H - 2 * border_y,
    );
    let cropped = Mat::roi(&inter, roi)?;

    let mut out = Mat::default();
    imgproc::resize(
        &cropped,
        &mut out,
        Size::new(config.imgw, config.imgh),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;
    Ok(out)
}

/// Single-channel view of a frame for the dense-flow path. Already-gray
/// frames pass through untouched.
pub fn to_gray(frame: &Mat) -> anyhow::Result<Mat> {
    if frame.channels() == 1 {
        return Ok(frame.clone());
    }
    let mut gray = Mat::default();
    imgproc::cvt_color(frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
    Ok(gray)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC1, CV_8UC3};

    fn frame(rows: i32, cols: i32, typ: i32) -> Mat {
        Mat::new_rows_cols_with_default(rows, cols, typ, Scalar::all(40.0)).unwrap()
    }

    #[test]
    fn output_size_is_canonical_for_native_input() {
        let config = Config::default();
        let out = normalize_frame(&frame(480, 640, CV_8UC3), &config).unwrap();
        assert_eq!((out.cols(), out.rows()), (config.imgw, config.imgh));
    }

    #[test]
    fn output_size_is_canonical_for_odd_input() {
        let config = Config::default();
        let out = normalize_frame(&frame(77, 123, CV_8UC3), &config).unwrap();
        assert_eq!((out.cols(), out.rows()), (config.imgw, config.imgh));
    }

    #[test]
    fn gray_passthrough_keeps_single_channel() {
        let gray = to_gray(&frame(240, 320, CV_8UC1)).unwrap();
        assert_eq!(gray.channels(), 1);
        let converted = to_gray(&frame(240, 320, CV_8UC3)).unwrap();
        assert_eq!(converted.channels(), 1);
    }
}
