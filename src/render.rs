use image::{GrayImage, ImageBuffer};
use ndarray::{ArrayView3, ShapeError, s};
use rayon::prelude::*;
use thiserror::Error;

use crate::decoder::{DecodedImage, PixelBuffer};
use crate::windowing::WindowLevel;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Frame does not match its geometry: {0}")]
    Shape(#[from] ShapeError),

    #[error("{columns}x{rows} bitmap cannot hold {len} pixels")]
    BitmapSize {
        columns: usize,
        rows: usize,
        len: usize,
    },
}

/// Rasterize the first sample plane of `image` through `window`.
///
/// Values are rescaled to modality units before windowing; MONOCHROME1
/// frames are inverted.
pub fn render_frame(image: &DecodedImage, window: WindowLevel) -> Result<GrayImage, RasterError> {
    let shape = (image.rows, image.columns, image.samples_per_pixel);
    let lut = LinearVoi {
        slope: image.rescale_slope,
        intercept: image.rescale_intercept,
        lower: window.lower(),
        width: window.width,
        invert: image.invert(),
    };
    let pixels = match &image.pixel_data {
        PixelBuffer::U8(data) => plane_to_gray(ArrayView3::from_shape(shape, data.as_slice())?, &lut),
        PixelBuffer::U16(data) => plane_to_gray(ArrayView3::from_shape(shape, data.as_slice())?, &lut),
        PixelBuffer::I16(data) => plane_to_gray(ArrayView3::from_shape(shape, data.as_slice())?, &lut),
    };
    gray_bitmap(image.columns, image.rows, pixels)
}

fn gray_bitmap(columns: usize, rows: usize, pixels: Vec<u8>) -> Result<GrayImage, RasterError> {
    let len = pixels.len();
    let size_error = || RasterError::BitmapSize { columns, rows, len };
    if columns.checked_mul(rows) != Some(len) {
        return Err(size_error());
    }
    let width = u32::try_from(columns).map_err(|_| size_error())?;
    let height = u32::try_from(rows).map_err(|_| size_error())?;
    ImageBuffer::from_raw(width, height, pixels).ok_or_else(size_error)
}

struct LinearVoi {
    slope: f64,
    intercept: f64,
    lower: f64,
    width: f64,
    invert: bool,
}

impl LinearVoi {
    #[inline]
    fn apply(&self, stored: f64) -> u8 {
        let value = stored.mul_add(self.slope, self.intercept);
        let normalized = ((value - self.lower) / self.width).clamp(0.0, 1.0);
        let gray = (normalized * 255.0).round() as u8;
        if self.invert { 255 - gray } else { gray }
    }
}

fn plane_to_gray<T>(frame: ArrayView3<'_, T>, lut: &LinearVoi) -> Vec<u8>
where
    T: Copy + Into<f64> + Sync,
{
    let plane = frame.slice(s![.., .., 0]);
    plane
        .into_par_iter()
        .map(|&v| lut.apply(v.into()))
        .collect()
}
