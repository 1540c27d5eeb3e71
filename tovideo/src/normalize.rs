//! Normalization of VOI-transformed samples into an 8-bit raster.

use image::GrayImage;
use snafu::{OptionExt, Snafu, ensure};

#[derive(Debug, Snafu)]
pub enum NormalizeError {
    /// Cannot rescale samples whose maximum after clipping is {max}
    Degenerate { max: f64 },

    /// Expected {expected} samples for a {columns}x{rows} raster, got {got}
    SampleCount {
        columns: u32,
        rows: u32,
        expected: usize,
        got: usize,
    },
}

pub type Result<T, E = NormalizeError> = std::result::Result<T, E>;

/// Clip negative values to zero, rescale linearly so that
/// the maximum becomes 255, and truncate to `u8`.
///
/// Fails with [`NormalizeError::Degenerate`] if no sample is positive
/// (such as in an all-zero image).
pub fn normalize(samples: &[f64]) -> Result<Vec<u8>> {
    let max = samples.iter().fold(0_f64, |acc, &v| acc.max(v));
    ensure!(max > 0. && max.is_finite(), DegenerateSnafu { max });

    Ok(samples
        .iter()
        .map(|&v| (v.max(0.) / max * 255.) as u8)
        .collect())
}

/// Normalize the samples of a single-channel frame
/// into a grayscale raster of the given dimensions.
pub fn to_gray_image(columns: u32, rows: u32, samples: &[f64]) -> Result<GrayImage> {
    let expected = columns as usize * rows as usize;
    ensure!(
        samples.len() == expected,
        SampleCountSnafu {
            columns,
            rows,
            expected,
            got: samples.len(),
        }
    );
    GrayImage::from_raw(columns, rows, normalize(samples)?).context(SampleCountSnafu {
        columns,
        rows,
        expected,
        got: samples.len(),
    })
}
