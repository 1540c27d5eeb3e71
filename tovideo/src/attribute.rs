//! Utility module for fetching the image and VOI attributes
//! needed to turn a DICOM object into a displayable raster.
//!
//! All functions work on a plain [`InMemDicomObject`],
//! so that they apply both to the root data set of a file
//! (through deref) and to the items of a sequence.

use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::{InMemDicomObject, mem::InMemElement};
use snafu::{OptionExt, ResultExt, Snafu, ensure};

#[derive(Debug, Snafu)]
pub enum GetAttributeError {
    #[snafu(display("Missing required attribute `{}`", name))]
    MissingRequired { name: &'static str },

    #[snafu(display("Could not convert attribute `{}`", name))]
    ConvertValue {
        name: &'static str,
        source: dicom_core::value::ConvertValueError,
    },

    #[snafu(display("Semantically invalid value `{}` for attribute `{}`", value, name))]
    InvalidValue { name: &'static str, value: String },
}

pub type Result<T, E = GetAttributeError> = std::result::Result<T, E>;

/// An interpreted representation of the DICOM _Pixel Representation_ attribute.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum PixelRepresentation {
    /// unsigned pixel data sample values
    Unsigned,
    /// signed pixel data sample values
    Signed,
}

/// The raw contents of one item of a LUT sequence
/// (_VOI LUT Sequence_ or _Modality LUT Sequence_).
#[derive(Debug, Clone, PartialEq)]
pub struct LutItem {
    /// the three values of _LUT Descriptor_:
    /// number of entries, first stored value mapped, nominal bit depth
    pub descriptor: [i32; 3],
    /// the _LUT Data_ entries
    pub data: Vec<u16>,
}

/// Get the SamplesPerPixel from the DICOM object
pub fn samples_per_pixel(obj: &InMemDicomObject) -> Result<u16> {
    retrieve_required_u16(obj, tags::SAMPLES_PER_PIXEL, "SamplesPerPixel")
}

/// Get the BitsStored from the DICOM object
pub fn bits_stored(obj: &InMemDicomObject) -> Result<u16> {
    let bits = retrieve_required_u16(obj, tags::BITS_STORED, "BitsStored")?;
    ensure!(
        (1..=32).contains(&bits),
        InvalidValueSnafu {
            name: "BitsStored",
            value: bits.to_string(),
        }
    );
    Ok(bits)
}

/// Get the PixelRepresentation from the DICOM object
pub fn pixel_representation(obj: &InMemDicomObject) -> Result<PixelRepresentation> {
    let p = retrieve_required_u16(obj, tags::PIXEL_REPRESENTATION, "PixelRepresentation")?;

    match p {
        0 => Ok(PixelRepresentation::Unsigned),
        1 => Ok(PixelRepresentation::Signed),
        _ => InvalidValueSnafu {
            name: "PixelRepresentation",
            value: p.to_string(),
        }
        .fail(),
    }
}

/// Get the PhotometricInterpretation from the DICOM object
pub fn photometric_interpretation(obj: &InMemDicomObject) -> Result<String> {
    let name = "PhotometricInterpretation";
    let elem = element_opt(obj, tags::PHOTOMETRIC_INTERPRETATION)
        .context(MissingRequiredSnafu { name })?;
    Ok(elem
        .value()
        .to_str()
        .context(ConvertValueSnafu { name })?
        .trim()
        .to_string())
}

/// Get the NumberOfFrames from the DICOM object,
/// returning 1 if it is not present
pub fn number_of_frames(obj: &InMemDicomObject) -> Result<u32> {
    let name = "NumberOfFrames";
    let Some(elem) = element_opt(obj, tags::NUMBER_OF_FRAMES) else {
        return Ok(1);
    };

    let integer = elem
        .value()
        .to_int::<i32>()
        .context(ConvertValueSnafu { name })?;

    ensure!(
        integer > 0,
        InvalidValueSnafu {
            name,
            value: integer.to_string(),
        }
    );

    Ok(integer as u32)
}

/// Retrieve all values of WindowCenter from the DICOM object if it exists.
pub fn window_centers(obj: &InMemDicomObject) -> Result<Option<Vec<f64>>> {
    retrieve_optional_multi_f64(obj, tags::WINDOW_CENTER, "WindowCenter")
}

/// Retrieve all values of WindowWidth from the DICOM object if it exists.
pub fn window_widths(obj: &InMemDicomObject) -> Result<Option<Vec<f64>>> {
    retrieve_optional_multi_f64(obj, tags::WINDOW_WIDTH, "WindowWidth")
}

/// Retrieve the RescaleSlope from the DICOM object if it exists.
pub fn rescale_slope(obj: &InMemDicomObject) -> Result<Option<f64>> {
    retrieve_optional_f64(obj, tags::RESCALE_SLOPE, "RescaleSlope")
}

/// Retrieve the RescaleIntercept from the DICOM object if it exists.
pub fn rescale_intercept(obj: &InMemDicomObject) -> Result<Option<f64>> {
    retrieve_optional_f64(obj, tags::RESCALE_INTERCEPT, "RescaleIntercept")
}

/// Get the VOILUTFunction from the DICOM object,
/// upper-cased and trimmed
pub fn voi_lut_function(obj: &InMemDicomObject) -> Result<Option<String>> {
    let name = "VOILUTFunction";
    let Some(elem) = element_opt(obj, tags::VOILUT_FUNCTION) else {
        return Ok(None);
    };

    let value = elem
        .value()
        .to_str()
        .context(ConvertValueSnafu { name })?
        .trim()
        .to_uppercase();
    Ok(Some(value))
}

/// Retrieve item `index` of the VOI LUT Sequence,
/// if the sequence exists and the item declares both
/// a LUT Descriptor and LUT Data.
pub fn voi_lut(obj: &InMemDicomObject, index: usize) -> Result<Option<LutItem>> {
    lut_item(obj, tags::VOILUT_SEQUENCE, index)
}

/// Retrieve the nominal bit depth declared by the first item
/// of the Modality LUT Sequence, if there is one.
pub fn modality_lut_bits(obj: &InMemDicomObject) -> Result<Option<i32>> {
    let Some(item) = sequence_item(obj, tags::MODALITY_LUT_SEQUENCE, 0) else {
        return Ok(None);
    };
    match element_opt(item, tags::LUT_DESCRIPTOR) {
        Some(elem) => lut_descriptor(elem).map(|d| Some(d[2])),
        None => Ok(None),
    }
}

fn lut_item(obj: &InMemDicomObject, tag: Tag, index: usize) -> Result<Option<LutItem>> {
    let Some(item) = sequence_item(obj, tag, index) else {
        return Ok(None);
    };
    let (Some(descriptor), Some(data)) = (
        element_opt(item, tags::LUT_DESCRIPTOR),
        element_opt(item, tags::LUT_DATA),
    ) else {
        return Ok(None);
    };

    let descriptor = lut_descriptor(descriptor)?;
    let data = lut_data(data, descriptor[2])?;
    Ok(Some(LutItem { descriptor, data }))
}

fn lut_descriptor(elem: &InMemElement) -> Result<[i32; 3]> {
    let name = "LUTDescriptor";
    let values = elem
        .value()
        .to_multi_int::<i32>()
        .context(ConvertValueSnafu { name })?;
    match values[..] {
        [entries, first, bits] => Ok([entries, first, bits]),
        _ => InvalidValueSnafu {
            name,
            value: format!("{:?}", values),
        }
        .fail(),
    }
}

fn lut_data(elem: &InMemElement, nominal_bits: i32) -> Result<Vec<u16>> {
    // OW data read without a known VR may come in as raw bytes
    if let Some(dicom_core::PrimitiveValue::U8(bytes)) = elem.value().primitive() {
        if nominal_bits > 8 {
            return Ok(bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect());
        }
        return Ok(bytes.iter().map(|&b| u16::from(b)).collect());
    }
    elem.value()
        .to_multi_int::<u16>()
        .context(ConvertValueSnafu { name: "LUTData" })
}

fn sequence_item(obj: &InMemDicomObject, tag: Tag, index: usize) -> Option<&InMemDicomObject> {
    element_opt(obj, tag)?.items()?.get(index)
}

#[inline]
fn element_opt(obj: &InMemDicomObject, tag: Tag) -> Option<&InMemElement> {
    obj.element(tag).ok()
}

#[inline]
fn retrieve_required_u16(obj: &InMemDicomObject, tag: Tag, name: &'static str) -> Result<u16> {
    element_opt(obj, tag)
        .context(MissingRequiredSnafu { name })?
        .value()
        .to_int::<u16>()
        .context(ConvertValueSnafu { name })
}

#[inline]
fn retrieve_optional_f64(obj: &InMemDicomObject, tag: Tag, name: &'static str) -> Result<Option<f64>> {
    element_opt(obj, tag)
        .map(|e| e.value().to_float64().context(ConvertValueSnafu { name }))
        .transpose()
}

#[inline]
fn retrieve_optional_multi_f64(
    obj: &InMemDicomObject,
    tag: Tag,
    name: &'static str,
) -> Result<Option<Vec<f64>>> {
    element_opt(obj, tag)
        .map(|e| {
            e.value()
                .to_multi_float64()
                .context(ConvertValueSnafu { name })
        })
        .transpose()
}
