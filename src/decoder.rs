use crate::enums::PhotometricInterpretation;
use crate::windowing::{MIN_WINDOW_WIDTH, WindowLevel};

use std::io::Cursor;

use dicom::core::{DataElement, PrimitiveValue, Tag, VR};
use dicom::object::{DefaultDicomObject, InMemDicomObject, from_reader};
use dicom::pixeldata::PixelDecoder;
use dicom_dictionary_std::tags;
use rayon::prelude::*;
use thiserror::Error;

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("No pixel data element found")]
    MissingPixelData,

    #[error("Unsupported bits allocated: {0}")]
    UnsupportedBitDepth(u16),

    #[error("Malformed geometry: {0}")]
    MalformedGeometry(String),

    #[error("DICOM parse error: {0}")]
    Parse(#[from] dicom::object::ReadError),

    #[error("Pixel data could not be decoded: {0}")]
    PixelData(#[from] dicom::pixeldata::Error),
}

/// Typed view over the native pixel bytes of one frame
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
}

impl PixelBuffer {
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::U8(data) => data.len(),
            PixelBuffer::U16(data) => data.len(),
            PixelBuffer::I16(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every `stride`-th stored value
    pub fn sample(&self, stride: usize) -> Vec<f64> {
        let stride = stride.max(1);
        match self {
            PixelBuffer::U8(data) => sample_values(data, stride),
            PixelBuffer::U16(data) => sample_values(data, stride),
            PixelBuffer::I16(data) => sample_values(data, stride),
        }
    }

    /// All values mapped through `value * slope + intercept`
    pub fn rescaled(&self, slope: f64, intercept: f64) -> Vec<f64> {
        match self {
            PixelBuffer::U8(data) => rescale_values(data, slope, intercept),
            PixelBuffer::U16(data) => rescale_values(data, slope, intercept),
            PixelBuffer::I16(data) => rescale_values(data, slope, intercept),
        }
    }
}

fn sample_values<T: Copy + Into<f64>>(data: &[T], stride: usize) -> Vec<f64> {
    data.iter()
        .step_by(stride)
        .map(|&v| v.into())
        .filter(|v: &f64| v.is_finite())
        .collect()
}

fn rescale_values<T: Copy + Into<f64> + Sync>(data: &[T], slope: f64, intercept: f64) -> Vec<f64> {
    data.par_iter()
        .map(|&v| v.into().mul_add(slope, intercept))
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub rows: usize,
    pub columns: usize,
    pub samples_per_pixel: usize,
    pub bits_allocated: u16,
    pub photometric_interpretation: PhotometricInterpretation,
    pub pixel_data: PixelBuffer,
    pub rescale_slope: f64,
    pub rescale_intercept: f64,
    pub row_spacing: f64,
    pub column_spacing: f64,
    pub native_window: Option<WindowLevel>,
    /// Native window when present, percentile estimate otherwise
    pub default_window: WindowLevel,
    pub min_pixel_value: f64,
    pub max_pixel_value: f64,
}

impl DecodedImage {
    pub fn pixel_data(&self) -> &PixelBuffer {
        &self.pixel_data
    }

    pub fn window_centers(&self) -> Vec<f64> {
        vec![self.default_window.center]
    }

    pub fn window_widths(&self) -> Vec<f64> {
        vec![self.default_window.width]
    }

    pub fn invert(&self) -> bool {
        self.photometric_interpretation.is_inverted()
    }

    /// Pixel values in modality units
    pub fn modality_values(&self) -> Vec<f64> {
        self.pixel_data
            .rescaled(self.rescale_slope, self.rescale_intercept)
    }
}

/// Decodes a DICOM byte stream with the default sampling target.
pub fn decode(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    FrameDecoder::default().decode(bytes)
}

#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    sample_target: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self {
            sample_target: 10_000,
        }
    }
}

impl FrameDecoder {
    pub fn new(sample_target: usize) -> Self {
        Self {
            sample_target: sample_target.max(1),
        }
    }

    /// Decode the first frame of a DICOM file
    ///
    /// Native and encapsulated transfer syntaxes go through
    /// [`PixelDecoder::decode_pixel_data`]; which compressed syntaxes work
    /// depends on the codecs built into `dicom`.
    ///
    /// # Errors
    ///
    /// Fails without producing a partial image when the data set cannot be
    /// parsed, has no pixel data, lacks usable rows/columns, allocates
    /// anything other than 8 or 16 bits per sample, or the codec rejects it.
    pub fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
        let mut object = Self::parse(bytes)?;

        if object.get(tags::PIXEL_DATA).is_none() {
            return Err(DecodeError::MissingPixelData);
        }
        let rows = Self::dimension(&object, tags::ROWS, "rows")?;
        let columns = Self::dimension(&object, tags::COLUMNS, "columns")?;
        let samples_per_pixel = read_int(&object, tags::SAMPLES_PER_PIXEL)
            .filter(|&n| n > 0)
            .unwrap_or(1) as u16;
        let bits_allocated = read_int(&object, tags::BITS_ALLOCATED).unwrap_or(8) as u16;
        if !matches!(bits_allocated, 8 | 16) {
            return Err(DecodeError::UnsupportedBitDepth(bits_allocated));
        }
        let signed = read_int(&object, tags::PIXEL_REPRESENTATION) == Some(1);
        let photometric_interpretation = object
            .get(tags::PHOTOMETRIC_INTERPRETATION)
            .and_then(|element| element.to_str().ok())
            .map(|value| PhotometricInterpretation::from_tag_value(&value))
            .unwrap_or_default();

        Self::fill_image_pixel_defaults(&mut object, samples_per_pixel, bits_allocated);
        let samples_per_pixel = usize::from(samples_per_pixel);
        let sample_count = rows * columns * samples_per_pixel;
        let pixel_data = Self::pixel_buffer(&object, bits_allocated, signed, sample_count)?;

        let rescale_slope = read_decimal(&object, tags::RESCALE_SLOPE)
            .filter(|&slope| slope != 0.0)
            .unwrap_or(1.0);
        let rescale_intercept = read_decimal(&object, tags::RESCALE_INTERCEPT).unwrap_or(0.0);
        let (row_spacing, column_spacing) = Self::pixel_spacing(&object);

        let stride = (sample_count / self.sample_target).max(1);
        let samples = pixel_data.sample(stride);
        let (min_pixel_value, max_pixel_value) =
            Self::sampled_range(&samples).unwrap_or((0.0, Self::full_range(bits_allocated)));

        let native_window = Self::native_window(&object);
        let default_window = native_window.unwrap_or_else(|| {
            Self::percentile_window(
                &samples,
                rescale_slope,
                rescale_intercept,
                (min_pixel_value, max_pixel_value),
            )
        });

        log::debug!(
            "Decoded {rows}x{columns} frame, {bits_allocated} bits, range [{min_pixel_value}, {max_pixel_value}]"
        );

        Ok(DecodedImage {
            rows,
            columns,
            samples_per_pixel,
            bits_allocated,
            photometric_interpretation,
            pixel_data,
            rescale_slope,
            rescale_intercept,
            row_spacing,
            column_spacing,
            native_window,
            default_window,
            min_pixel_value,
            max_pixel_value,
        })
    }

    fn parse(bytes: &[u8]) -> Result<DefaultDicomObject, DecodeError> {
        let has_preamble = bytes
            .get(PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len())
            .is_some_and(|magic| magic == MAGIC);
        let source = if has_preamble {
            &bytes[PREAMBLE_LEN..]
        } else {
            bytes
        };
        Ok(from_reader(Cursor::new(source.to_vec()))?)
    }

    /// The pixel decoder insists on the full Image Pixel module; files that
    /// leave parts of it out get the values this decoder already assumes.
    fn fill_image_pixel_defaults(
        object: &mut DefaultDicomObject,
        samples_per_pixel: u16,
        bits_allocated: u16,
    ) {
        let photometric = if samples_per_pixel == 1 {
            "MONOCHROME2 "
        } else {
            "RGB "
        };
        let defaults = [
            (tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(samples_per_pixel)),
            (tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(bits_allocated)),
            (tags::BITS_STORED, VR::US, PrimitiveValue::from(bits_allocated)),
            (tags::HIGH_BIT, VR::US, PrimitiveValue::from(bits_allocated - 1)),
            (tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)),
            (tags::PHOTOMETRIC_INTERPRETATION, VR::CS, PrimitiveValue::from(photometric)),
            (tags::PLANAR_CONFIGURATION, VR::US, PrimitiveValue::from(0_u16)),
        ];
        for (tag, vr, value) in defaults {
            if tag == tags::PLANAR_CONFIGURATION && samples_per_pixel == 1 {
                continue;
            }
            if object.get(tag).is_none() {
                object.put(DataElement::new(tag, vr, value));
            }
        }
    }

    fn dimension(object: &InMemDicomObject, tag: Tag, name: &str) -> Result<usize, DecodeError> {
        match read_int(object, tag) {
            Some(value) if value > 0 => Ok(value as usize),
            Some(_) => Err(DecodeError::MalformedGeometry(format!("{name} is zero"))),
            None => Err(DecodeError::MalformedGeometry(format!("{name} missing"))),
        }
    }

    /// Typed samples of the first frame; trailing frames and padding are
    /// dropped.
    fn pixel_buffer(
        object: &DefaultDicomObject,
        bits_allocated: u16,
        signed: bool,
        sample_count: usize,
    ) -> Result<PixelBuffer, DecodeError> {
        let decoded = object.decode_pixel_data()?;
        let short = |held: usize| {
            DecodeError::MalformedGeometry(format!(
                "pixel data holds {held} samples, geometry needs {sample_count}"
            ))
        };

        if bits_allocated == 8 {
            let data = decoded.data();
            let frame = data.get(..sample_count).ok_or_else(|| short(data.len()))?;
            return Ok(PixelBuffer::U8(frame.to_vec()));
        }
        let words = decoded.data_ow();
        let frame = words
            .get(..sample_count)
            .ok_or_else(|| short(words.len()))?;
        Ok(if signed {
            PixelBuffer::I16(frame.iter().map(|&word| word as i16).collect())
        } else {
            PixelBuffer::U16(frame.to_vec())
        })
    }

    fn pixel_spacing(object: &InMemDicomObject) -> (f64, f64) {
        read_decimals(object, tags::PIXEL_SPACING)
            .filter(|values| values.len() >= 2)
            .map(|values| (values[0], values[1]))
            .filter(|&(row, column)| {
                row.is_finite() && column.is_finite() && row > 0.0 && column > 0.0
            })
            .unwrap_or((1.0, 1.0))
    }

    fn native_window(object: &InMemDicomObject) -> Option<WindowLevel> {
        let center = read_decimal(object, tags::WINDOW_CENTER)?;
        let width = read_decimal(object, tags::WINDOW_WIDTH).filter(|&w| w > 0.0)?;
        Some(WindowLevel::new(center, width))
    }

    fn sampled_range(samples: &[f64]) -> Option<(f64, f64)> {
        samples.iter().fold(None, |acc, &value| match acc {
            None => Some((value, value)),
            Some((min, max)) => Some((min.min(value), max.max(value))),
        })
    }

    fn full_range(bits_allocated: u16) -> f64 {
        2f64.powi(i32::from(bits_allocated)) - 1.0
    }

    /// Clipping at the 1st/99th percentile keeps a single outlier from
    /// collapsing the window.
    fn percentile_window(
        samples: &[f64],
        slope: f64,
        intercept: f64,
        fallback: (f64, f64),
    ) -> WindowLevel {
        let mut rescaled: Vec<f64> = samples
            .iter()
            .map(|v| v.mul_add(slope, intercept))
            .collect();
        if rescaled.is_empty() {
            let lower = fallback.0.mul_add(slope, intercept);
            let upper = fallback.1.mul_add(slope, intercept);
            return WindowLevel::from_bounds(lower.min(upper), lower.max(upper));
        }
        rescaled.sort_by(f64::total_cmp);

        let p1 = percentile(&rescaled, 0.01);
        let p99 = percentile(&rescaled, 0.99);
        WindowLevel::new((p99 + p1) / 2.0, (p99 - p1).max(MIN_WINDOW_WIDTH))
    }
}

fn percentile(sorted: &[f64], fraction: f64) -> f64 {
    let index = ((sorted.len() - 1) as f64 * fraction).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}

fn read_int(object: &InMemDicomObject, tag: Tag) -> Option<u32> {
    object.get(tag)?.to_int::<u32>().ok()
}

fn read_decimals(object: &InMemDicomObject, tag: Tag) -> Option<Vec<f64>> {
    object.get(tag)?.to_multi_float64().ok()
}

fn read_decimal(object: &InMemDicomObject, tag: Tag) -> Option<f64> {
    read_decimals(object, tag)?
        .first()
        .copied()
        .filter(|value| value.is_finite())
}
