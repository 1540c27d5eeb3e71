//! Value of Interest (VOI) transformation of pixel sample values.
//!
//! A DICOM image may declare how its stored sample values
//! should be mapped to display intensities,
//! either through a window level (_Window Center_ and _Window Width_,
//! with an optional _VOI LUT Function_)
//! or through an explicit table in the _VOI LUT Sequence_.
//! [`VoiTransform::from_object`] resolves which of these applies
//! to a given object,
//! and [`VoiTransform::apply`] maps individual values.

use dicom_object::InMemDicomObject;
use snafu::{ResultExt, Snafu, ensure};

use crate::attribute::{self, GetAttributeError, LutItem, PixelRepresentation};

#[derive(Debug, Snafu)]
pub enum VoiError {
    /// Could not read VOI attributes
    Attribute { source: GetAttributeError },

    /// Window width {width} is invalid for the {function:?} VOI LUT function
    InvalidWindowWidth {
        function: VoiLutFunction,
        width: f64,
    },

    /// Unsupported VOI LUT function `{name}`
    UnsupportedFunction { name: String },

    /// Window center and width have no value at index {index}
    MissingWindow { index: usize },

    /// Windowing requires a monochrome image, got `{pi}`
    NotMonochrome { pi: String },

    /// Unsupported VOI LUT nominal bit depth {bits}
    UnsupportedLutBits { bits: i32 },

    /// VOI LUT declares {entries} entries but holds {len} values
    LutLengthMismatch { entries: u32, len: usize },
}

pub type Result<T, E = VoiError> = std::result::Result<T, E>;

/// A known DICOM Value of Interest (VOI) LUT function descriptor.
#[derive(Debug, Copy, Clone, Default, Eq, Hash, PartialEq)]
pub enum VoiLutFunction {
    /// LINEAR
    #[default]
    Linear,
    /// LINEAR_EXACT
    LinearExact,
    /// SIGMOID
    Sigmoid,
}

impl std::str::FromStr for VoiLutFunction {
    type Err = VoiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LINEAR" => Ok(Self::Linear),
            "LINEAR_EXACT" => Ok(Self::LinearExact),
            "SIGMOID" => Ok(Self::Sigmoid),
            _ => UnsupportedFunctionSnafu { name: s }.fail(),
        }
    }
}

/// The parameters of a single window level
/// for a VOI LUT transformation,
/// comprising the window center and the window width.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WindowLevel {
    /// The _Window Width_.
    pub width: f64,
    /// The _Window Center_.
    pub center: f64,
}

/// The range of values produced by a window level transformation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct OutputRange {
    pub min: f64,
    pub max: f64,
}

impl OutputRange {
    /// The output range of a window level
    /// over the image's own value domain.
    ///
    /// This is `[0, 2^n - 1]` with `n` the nominal bit depth
    /// of the _Modality LUT Sequence_ if there is one;
    /// otherwise the full range of stored values
    /// given _Bits Stored_ and _Pixel Representation_,
    /// mapped through the rescale function
    /// if both _Rescale Slope_ and _Rescale Intercept_ are present.
    pub fn from_object(obj: &InMemDicomObject) -> Result<Self> {
        let (min, max) = match attribute::modality_lut_bits(obj).context(AttributeSnafu)? {
            Some(bits) => (0., 2_f64.powi(bits) - 1.),
            None => {
                let bits_stored = attribute::bits_stored(obj).context(AttributeSnafu)? as i32;
                match attribute::pixel_representation(obj).context(AttributeSnafu)? {
                    PixelRepresentation::Unsigned => (0., 2_f64.powi(bits_stored) - 1.),
                    PixelRepresentation::Signed => (
                        -(2_f64.powi(bits_stored - 1)),
                        2_f64.powi(bits_stored - 1) - 1.,
                    ),
                }
            }
        };

        let slope = attribute::rescale_slope(obj).context(AttributeSnafu)?;
        let intercept = attribute::rescale_intercept(obj).context(AttributeSnafu)?;
        Ok(match (slope, intercept) {
            (Some(slope), Some(intercept)) => OutputRange {
                min: min * slope + intercept,
                max: max * slope + intercept,
            },
            _ => OutputRange { min, max },
        })
    }

    #[inline]
    fn span(&self) -> f64 {
        self.max - self.min
    }
}

/// A full description of a VOI LUT function transformation
/// based on a window level.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WindowLevelTransform {
    voi_lut_function: VoiLutFunction,
    window_level: WindowLevel,
}

impl WindowLevelTransform {
    /// Create a new window level transformation.
    ///
    /// The width of the given `window_level` must be `>= 1`
    /// for the [`Linear`](VoiLutFunction::Linear) function,
    /// and `> 0` for the other functions.
    pub fn new(voi_lut_function: VoiLutFunction, window_level: WindowLevel) -> Result<Self> {
        let width = window_level.width;
        let valid = match voi_lut_function {
            VoiLutFunction::Linear => width >= 1.,
            VoiLutFunction::LinearExact | VoiLutFunction::Sigmoid => width > 0.,
        };
        ensure!(
            valid,
            InvalidWindowWidthSnafu {
                function: voi_lut_function,
                width,
            }
        );
        Ok(WindowLevelTransform {
            voi_lut_function,
            window_level,
        })
    }

    /// Create a new window level transformation
    /// with the `LINEAR` function.
    #[inline]
    pub fn linear(window_level: WindowLevel) -> Result<Self> {
        Self::new(VoiLutFunction::Linear, window_level)
    }

    /// Apply the window level transformation on a value,
    /// into a number within `range`.
    pub fn apply(&self, value: f64, range: OutputRange) -> f64 {
        let WindowLevel { width, center } = self.window_level;
        match self.voi_lut_function {
            VoiLutFunction::Linear => window_level_linear(value, width, center, range),
            VoiLutFunction::LinearExact => window_level_linear_exact(value, width, center, range),
            VoiLutFunction::Sigmoid => window_level_sigmoid(value, width, center, range),
        }
    }
}

fn window_level_linear(value: f64, width: f64, center: f64, range: OutputRange) -> f64 {
    debug_assert!(width >= 1.);

    // C.11.2.1.2.1

    let min = center - 0.5 - (width - 1.) / 2.;
    let max = center - 0.5 + (width - 1.) / 2.;

    if value <= min {
        // if (x <= c - 0.5 - (w-1) / 2), then y = ymin
        range.min
    } else if value > max {
        // else if (x > c - 0.5 + (w-1) /2), then y = ymax
        range.max
    } else {
        // else y = ((x - (c - 0.5)) / (w-1) + 0.5) * (ymax- ymin) + ymin
        // (unreachable with w = 1)
        ((value - (center - 0.5)) / (width - 1.) + 0.5) * range.span() + range.min
    }
}

fn window_level_linear_exact(value: f64, width: f64, center: f64, range: OutputRange) -> f64 {
    debug_assert!(width > 0.);

    // C.11.2.1.3.2

    let min = center - width / 2.;
    let max = center + width / 2.;

    if value <= min {
        range.min
    } else if value > max {
        range.max
    } else {
        // y = ((x - c) / w + 0.5) * (ymax - ymin) + ymin
        ((value - center) / width + 0.5) * range.span() + range.min
    }
}

fn window_level_sigmoid(value: f64, width: f64, center: f64, range: OutputRange) -> f64 {
    debug_assert!(width > 0.);

    // C.11.2.1.3.1

    range.span() / (1. + f64::exp(-4. * (value - center) / width)) + range.min
}

/// An explicit VOI look-up table,
/// as declared in an item of the _VOI LUT Sequence_.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiLut {
    /// the first stored value mapped by the table
    first_mapped: i64,
    /// the output value for each table entry
    table: Vec<u16>,
}

impl VoiLut {
    /// Build the table from a raw LUT sequence item.
    ///
    /// A number of entries of 0 in the descriptor means 65536.
    /// The nominal bit depth must be 8 or between 10 and 16.
    pub fn from_item(item: LutItem) -> Result<Self> {
        let [entries, first_mapped, bits] = item.descriptor;
        ensure!(
            bits == 8 || (10..=16).contains(&bits),
            UnsupportedLutBitsSnafu { bits }
        );

        // the descriptor may come in as SS, recover the unsigned count
        let entries = match entries as u16 {
            0 => 65_536_u32,
            n => u32::from(n),
        };
        let mut table = item.data;
        ensure!(
            table.len() >= entries as usize,
            LutLengthMismatchSnafu {
                entries,
                len: table.len(),
            }
        );
        table.truncate(entries as usize);

        Ok(VoiLut {
            first_mapped: i64::from(first_mapped),
            table,
        })
    }

    /// Map a stored value through the table.
    ///
    /// Values at or below the first mapped value take the first entry,
    /// values past the end of the table take the last entry.
    pub fn apply(&self, value: f64) -> f64 {
        let last = self.table.len() - 1;
        let offset = value - self.first_mapped as f64;
        let index = if offset <= 0. {
            0
        } else if offset >= last as f64 {
            last
        } else {
            offset as usize
        };
        f64::from(self.table[index])
    }
}

/// Options for resolving the VOI transform of an object.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct VoiOptions {
    /// which window (or VOI LUT item) to use
    /// when several are declared
    pub index: usize,
    /// use the window level even if a VOI LUT table is also present
    pub prefer_window: bool,
}

/// The VOI transformation of a specific image.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiTransform {
    /// no VOI information, values are kept as is
    Identity,
    /// window level over the image's output range
    Window {
        transform: WindowLevelTransform,
        range: OutputRange,
    },
    /// explicit look-up table
    Lut(VoiLut),
}

impl VoiTransform {
    /// Resolve the VOI transform declared by the given object.
    ///
    /// A VOI LUT table is used over a window level
    /// unless `options.prefer_window` is set.
    /// Objects with neither get the identity transform.
    pub fn from_object(obj: &InMemDicomObject, options: VoiOptions) -> Result<Self> {
        let lut = attribute::voi_lut(obj, options.index).context(AttributeSnafu)?;
        let centers = attribute::window_centers(obj).context(AttributeSnafu)?;
        let widths = attribute::window_widths(obj).context(AttributeSnafu)?;
        let has_window = centers.is_some() && widths.is_some();

        match lut {
            Some(lut) if !(has_window && options.prefer_window) => {
                return Ok(VoiTransform::Lut(VoiLut::from_item(lut)?));
            }
            _ => {}
        }

        let (Some(centers), Some(widths)) = (centers, widths) else {
            return Ok(VoiTransform::Identity);
        };

        let pi = attribute::photometric_interpretation(obj).context(AttributeSnafu)?;
        ensure!(
            pi == "MONOCHROME1" || pi == "MONOCHROME2",
            NotMonochromeSnafu { pi }
        );

        // a single window applies whatever the index
        let index = options.index;
        let pick = |values: &[f64]| match values {
            [single] => Some(*single),
            _ => values.get(index).copied(),
        };
        let (Some(center), Some(width)) = (pick(&centers), pick(&widths)) else {
            return MissingWindowSnafu { index }.fail();
        };

        let function = match attribute::voi_lut_function(obj).context(AttributeSnafu)? {
            Some(name) => name.parse()?,
            None => VoiLutFunction::default(),
        };

        Ok(VoiTransform::Window {
            transform: WindowLevelTransform::new(function, WindowLevel { width, center })?,
            range: OutputRange::from_object(obj)?,
        })
    }

    /// Apply the transformation to a single sample value.
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            VoiTransform::Identity => value,
            VoiTransform::Window { transform, range } => transform.apply(value, *range),
            VoiTransform::Lut(lut) => lut.apply(value),
        }
    }

    /// Apply the transformation to all samples in place.
    pub fn apply_all(&self, samples: &mut [f64]) {
        if let VoiTransform::Identity = self {
            return;
        }
        for v in samples {
            *v = self.apply(*v);
        }
    }
}
