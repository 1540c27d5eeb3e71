//! Conversion of a directory of DICOM images
//! into 8-bit grayscale PNG frames,
//! optionally assembled into an MP4 video.
//!
//! # Example
//!
//! ```no_run
//! # use std::path::Path;
//! use dicom_tovideo::{ConversionOptions, convert_dir};
//!
//! let summary = convert_dir(
//!     Path::new("incoming"),
//!     Path::new("incoming/PNG"),
//!     &ConversionOptions::new(),
//! )?;
//! println!("{} converted, {} failed", summary.converted.len(), summary.failed.len());
//! # Ok::<(), dicom_tovideo::Error>(())
//! ```
pub mod attribute;
pub mod convert;
pub mod normalize;
pub mod scan;
pub mod video;
pub mod voi;

pub use convert::{
    ConversionOptions, ConvertError, Error, ErrorKind, Summary, convert_dir, convert_file,
    to_raster,
};
pub use video::{VideoError, VideoOptions, assemble_video};
pub use voi::{VoiLutFunction, VoiOptions, VoiTransform, WindowLevel, WindowLevelTransform};
