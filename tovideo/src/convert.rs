//! Conversion of DICOM files into 8-bit grayscale PNG files.
//!
//! Each file goes through the same steps:
//! decode the raw stored sample values of one frame,
//! apply the VOI transform declared by the file,
//! clip and rescale to the 8-bit range,
//! and save the result as `<file stem>.png` in the staging directory.
//!
//! Failures are isolated per file:
//! [`convert_dir`] logs them, collects them in the [`Summary`],
//! and carries on with the next file.

use std::path::{Path, PathBuf};

use dicom_object::{DefaultDicomObject, open_file};
use dicom_pixeldata::{ModalityLutOption, PixelDecoder};
use image::{GrayImage, ImageFormat};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use tracing::{debug, error, info, warn};

use crate::attribute::{self, GetAttributeError};
use crate::normalize::{self, NormalizeError};
use crate::scan::{self, ScanError};
use crate::voi::{VoiError, VoiOptions, VoiTransform};

/// An error which prevents a whole batch from running.
#[derive(Debug, Snafu)]
pub enum Error {
    /// Could not list input files
    Scan { source: ScanError },

    #[snafu(display("Staging directory {} does not exist", path.display()))]
    StagingMissing { path: PathBuf },

    #[snafu(display("Could not create staging directory {}", path.display()))]
    CreateStaging {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The category of a per-file conversion failure.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// the source file could not be read or interpreted
    Decode,
    /// the pixel data cannot be rescaled to 8 bits
    Normalization,
    /// the output file could not be written
    Write,
}

/// An error which occurred while converting a single file.
#[derive(Debug, Snafu)]
pub enum ConvertError {
    /// Could not open DICOM file
    OpenFile { source: dicom_object::ReadError },

    /// Could not decode pixel data
    DecodePixelData { source: dicom_pixeldata::Error },

    /// Could not read image attributes
    Attribute { source: GetAttributeError },

    /// Unsupported samples per pixel {spp}, only grayscale images are supported
    UnsupportedSamplesPerPixel { spp: u16 },

    /// Frame #{frame} is out of range, the image has {frames} frame(s)
    FrameOutOfRange { frame: u32, frames: u32 },

    /// Could not resolve the VOI transform
    Voi { source: VoiError },

    /// Could not normalize pixel data
    Normalize { source: NormalizeError },

    #[snafu(display("Cannot derive an output file name from {}", path.display()))]
    InvalidOutputName { path: PathBuf },

    #[snafu(display("Could not write image to {}", path.display()))]
    WriteImage {
        path: PathBuf,
        source: image::ImageError,
    },
}

impl ConvertError {
    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::Normalize {
                source: NormalizeError::Degenerate { .. },
            } => ErrorKind::Normalization,
            ConvertError::InvalidOutputName { .. } | ConvertError::WriteImage { .. } => {
                ErrorKind::Write
            }
            _ => ErrorKind::Decode,
        }
    }
}

/// Options for converting DICOM files.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    /// the file extensions recognized as DICOM files
    pub extensions: Vec<String>,
    /// the frame to convert in multi-frame images
    pub frame: u32,
    /// how to resolve the VOI transform
    pub voi: VoiOptions,
    /// whether to create the staging directory when missing
    pub create_staging: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        ConversionOptions {
            extensions: vec!["dcm".to_string()],
            frame: 0,
            voi: VoiOptions::default(),
            create_staging: true,
        }
    }
}

impl ConversionOptions {
    /// Create a new set of options with the defaults:
    /// `.dcm` files, first frame, first window, VOI LUT preferred,
    /// staging directory created on demand.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the recognized file extensions (without the leading dot).
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_string())
            .collect();
        self
    }

    /// Set the frame number to convert (0-indexed).
    pub fn with_frame(mut self, frame: u32) -> Self {
        self.frame = frame;
        self
    }

    /// Set which window center/width pair to use.
    pub fn with_window_index(mut self, index: usize) -> Self {
        self.voi.index = index;
        self
    }

    /// Use the window level even if a VOI LUT table is present.
    pub fn prefer_window(mut self) -> Self {
        self.voi.prefer_window = true;
        self
    }

    /// Fail instead of creating a missing staging directory.
    pub fn without_staging_creation(mut self) -> Self {
        self.create_staging = false;
        self
    }
}

/// The outcome of converting a directory.
#[derive(Debug, Default)]
pub struct Summary {
    /// the PNG files written, in processing order
    pub converted: Vec<PathBuf>,
    /// the source files which could not be converted
    pub failed: Vec<(PathBuf, ConvertError)>,
    /// number of directory entries which were not DICOM files
    pub skipped: usize,
}

impl Summary {
    /// Whether all DICOM files were converted.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Convert every DICOM file directly inside `input_dir`
/// into a PNG file in `staging_dir`.
///
/// Files are processed one at a time in file name order.
/// A failure in one file is logged and recorded in the summary
/// without stopping the others.
pub fn convert_dir(
    input_dir: &Path,
    staging_dir: &Path,
    options: &ConversionOptions,
) -> Result<Summary, Error> {
    let scan = scan::scan_dir(input_dir, &options.extensions).context(ScanSnafu)?;
    prepare_staging(staging_dir, options.create_staging)?;

    info!(
        "Converting {} DICOM file(s) from {} into {}",
        scan.files.len(),
        input_dir.display(),
        staging_dir.display()
    );

    let mut summary = Summary {
        skipped: scan.skipped,
        ..Default::default()
    };

    for file in scan.files {
        match convert_file(&file, staging_dir, options) {
            Ok(output) => {
                info!(
                    "PNG created: {}",
                    output.file_name().unwrap_or_default().to_string_lossy()
                );
                summary.converted.push(output);
            }
            Err(e) => {
                error!(
                    "Failed to convert {}: {}",
                    file.display(),
                    snafu::Report::from_error(&e)
                );
                summary.failed.push((file, e));
            }
        }
    }

    Ok(summary)
}

fn prepare_staging(staging_dir: &Path, create: bool) -> Result<(), Error> {
    if staging_dir.is_dir() {
        return Ok(());
    }
    ensure!(create, StagingMissingSnafu { path: staging_dir });
    debug!("Creating staging directory {}", staging_dir.display());
    std::fs::create_dir_all(staging_dir).context(CreateStagingSnafu { path: staging_dir })
}

/// Convert a single DICOM file into `<file stem>.png` in `staging_dir`,
/// returning the path of the written file.
pub fn convert_file(
    file: &Path,
    staging_dir: &Path,
    options: &ConversionOptions,
) -> Result<PathBuf, ConvertError> {
    let output = output_path(file, staging_dir)?;

    let obj = open_file(file).context(OpenFileSnafu)?;
    let image = to_raster(&obj, options)?;

    image
        .save_with_format(&output, ImageFormat::Png)
        .context(WriteImageSnafu { path: &output })?;

    Ok(output)
}

/// The PNG file name for `file`: its stem, dots included, plus `.png`.
fn output_path(file: &Path, staging_dir: &Path) -> Result<PathBuf, ConvertError> {
    let stem = file
        .file_stem()
        .context(InvalidOutputNameSnafu { path: file })?;
    let mut name = stem.to_os_string();
    name.push(".png");
    Ok(staging_dir.join(name))
}

/// Turn a DICOM object into a normalized 8-bit grayscale raster.
pub fn to_raster(
    obj: &DefaultDicomObject,
    options: &ConversionOptions,
) -> Result<GrayImage, ConvertError> {
    let spp = attribute::samples_per_pixel(obj).context(AttributeSnafu)?;
    ensure!(spp == 1, UnsupportedSamplesPerPixelSnafu { spp });

    let frames = attribute::number_of_frames(obj).context(AttributeSnafu)?;
    let frame = options.frame;
    ensure!(frame < frames, FrameOutOfRangeSnafu { frame, frames });
    if frames > 1 {
        debug!("Converting frame #{} of {}", frame, frames);
    }

    let voi = VoiTransform::from_object(obj, options.voi).context(VoiSnafu)?;
    debug!("VOI transform: {:?}", voi);

    let pixel = obj.decode_pixel_data().context(DecodePixelDataSnafu)?;
    let columns = pixel.columns();
    let rows = pixel.rows();

    // raw stored values, the VOI transform is applied on them directly
    let convert_options =
        dicom_pixeldata::ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
    let mut samples: Vec<f64> = pixel
        .to_vec_frame_with_options(frame, &convert_options)
        .context(DecodePixelDataSnafu)?;

    voi.apply_all(&mut samples);

    match normalize::to_gray_image(columns, rows, &samples) {
        Err(e @ NormalizeError::Degenerate { .. }) => {
            warn!("{}x{} image has no positive sample to rescale", columns, rows);
            Err(e).context(NormalizeSnafu)
        }
        other => other.context(NormalizeSnafu),
    }
}
