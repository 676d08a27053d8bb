use dicom::core::value::{PixelFragmentSequence, Value};
use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::{tags, uids};

/// Builds in-memory DICOM files for decoder and loader tests
pub(crate) struct FrameBuilder {
    object: InMemDicomObject,
    transfer_syntax: &'static str,
}

impl FrameBuilder {
    pub(crate) fn new(rows: u16, columns: u16) -> Self {
        let mut object = InMemDicomObject::new_empty();
        object.put(DataElement::new(
            tags::ROWS,
            VR::US,
            PrimitiveValue::from(rows),
        ));
        object.put(DataElement::new(
            tags::COLUMNS,
            VR::US,
            PrimitiveValue::from(columns),
        ));
        Self {
            object,
            transfer_syntax: uids::EXPLICIT_VR_LITTLE_ENDIAN,
        }
    }

    pub(crate) fn bits_allocated(mut self, bits: u16) -> Self {
        self.object.put(DataElement::new(
            tags::BITS_ALLOCATED,
            VR::US,
            PrimitiveValue::from(bits),
        ));
        self
    }

    pub(crate) fn pixel_representation(mut self, value: u16) -> Self {
        self.object.put(DataElement::new(
            tags::PIXEL_REPRESENTATION,
            VR::US,
            PrimitiveValue::from(value),
        ));
        self
    }

    pub(crate) fn pixels_u8(mut self, pixels: Vec<u8>) -> Self {
        self.object.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            PrimitiveValue::U8(pixels.into()),
        ));
        self.bits_allocated(8)
    }

    /// One RLE Lossless fragment holding a single literal run of 8-bit
    /// samples (at most 128 of them)
    pub(crate) fn rle_pixels_u8(mut self, pixels: &[u8]) -> Self {
        let mut fragment = Vec::with_capacity(64 + pixels.len() + 2);
        fragment.extend_from_slice(&1_u32.to_le_bytes());
        fragment.extend_from_slice(&64_u32.to_le_bytes());
        fragment.resize(64, 0);
        fragment.push((pixels.len() - 1) as u8);
        fragment.extend_from_slice(pixels);
        if fragment.len() % 2 == 1 {
            // no-op run
            fragment.push(0x80);
        }
        self.object.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            Value::PixelSequence(PixelFragmentSequence::new(Vec::<u32>::new(), vec![fragment])),
        ));
        self.transfer_syntax = uids::RLE_LOSSLESS;
        self.bits_allocated(8)
    }

    pub(crate) fn samples_per_pixel(mut self, samples: u16) -> Self {
        self.object.put(DataElement::new(
            tags::SAMPLES_PER_PIXEL,
            VR::US,
            PrimitiveValue::from(samples),
        ));
        self
    }

    pub(crate) fn pixels_u16(mut self, pixels: Vec<u16>) -> Self {
        self.object.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OW,
            PrimitiveValue::U16(pixels.into()),
        ));
        self.bits_allocated(16)
    }

    pub(crate) fn window(self, center: &str, width: &str) -> Self {
        self.decimal(tags::WINDOW_CENTER, center)
            .decimal(tags::WINDOW_WIDTH, width)
    }

    pub(crate) fn rescale(self, slope: &str, intercept: &str) -> Self {
        self.decimal(tags::RESCALE_SLOPE, slope)
            .decimal(tags::RESCALE_INTERCEPT, intercept)
    }

    pub(crate) fn spacing(self, value: &str) -> Self {
        self.decimal(tags::PIXEL_SPACING, value)
    }

    pub(crate) fn photometric(mut self, value: &str) -> Self {
        self.object.put(DataElement::new(
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            PrimitiveValue::from(even_length(value)),
        ));
        self
    }

    fn decimal(mut self, tag: dicom::core::Tag, value: &str) -> Self {
        self.object
            .put(DataElement::new(tag, VR::DS, PrimitiveValue::from(even_length(value))));
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let file = self
            .object
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(self.transfer_syntax)
                    .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                    .media_storage_sop_instance_uid("2.25.4412078531"),
            )
            .expect("file meta should build");
        let mut bytes = Vec::new();
        file.write_all(&mut bytes)
            .expect("in-memory write should succeed");
        bytes
    }
}

/// Text values are space padded to an even length
fn even_length(value: &str) -> String {
    let mut padded = value.to_string();
    if padded.len() % 2 == 1 {
        padded.push(' ');
    }
    padded
}
