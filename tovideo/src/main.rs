//! A CLI tool for converting a directory of DICOM image files
//! into PNG frames and, optionally, an MP4 video.
use std::path::PathBuf;

use clap::Parser;
use dicom_tovideo::{ConversionOptions, VideoOptions, assemble_video, convert_dir};
use snafu::{Report, ResultExt, Whatever};
use tracing::{error, info, warn, Level};

const MAN_PAGE: &str = "\
NAME

    dicom-tovideo

SYNOPSIS

    dicom-tovideo [OPTIONS] <INPUT_DIR> <OUTPUT_DIR>

DESCRIPTION

    Converts every DICOM file (`*.dcm`) directly inside INPUT_DIR
    into an 8-bit grayscale PNG file in the staging directory
    (`INPUT_DIR/PNG` unless `--staging` is given).
    Each image goes through its own VOI transform
    (VOI LUT table or window level),
    negative values are clipped to zero,
    and the result is rescaled so that its brightest value becomes 255.

    With `--video`, the PNG files are then assembled, in file name order,
    into an MP4 video in OUTPUT_DIR using FFmpeg.

    Files which cannot be converted are reported and skipped;
    the exit status is non-zero if any file failed.

EXAMPLE

    dicom-tovideo /incoming /outgoing --video --fps 12
";

/// Convert a directory of DICOM files into PNG frames and an MP4 video
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    /// Directory containing the DICOM files
    #[arg(required_unless_present = "man")]
    input_dir: Option<PathBuf>,

    /// Directory receiving the video
    #[arg(required_unless_present = "man")]
    output_dir: Option<PathBuf>,

    /// Directory receiving the PNG files
    /// (default is the `PNG` subdirectory of the input directory)
    #[arg(long = "staging")]
    staging: Option<PathBuf>,

    /// Fail if the staging directory does not exist instead of creating it
    #[arg(long = "no-create-staging")]
    no_create_staging: bool,

    /// File extension recognized as DICOM (can be repeated)
    #[arg(long = "ext", default_value = "dcm")]
    extensions: Vec<String>,

    /// Frame number (0-indexed)
    #[arg(short = 'F', long = "frame", default_value = "0")]
    frame_number: u32,

    /// Index of the window center/width pair to use
    /// (ignored when the file declares a single window)
    #[arg(long = "window-index", default_value = "0")]
    window_index: usize,

    /// Use the window level even if the file has a VOI LUT table
    #[arg(long = "prefer-window")]
    prefer_window: bool,

    /// Assemble the PNG files into an MP4 video
    #[arg(long = "video")]
    video: bool,

    /// File name of the video in the output directory
    #[arg(long = "video-name", default_value = "video.mp4")]
    video_name: String,

    /// Video frame rate
    #[arg(long = "fps", default_value = "10")]
    fps: u32,

    /// Video codec
    #[arg(long = "codec", default_value = "libx264")]
    codec: String,

    /// Path to the FFmpeg executable
    #[arg(long = "ffmpeg", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Print the manual page and exit
    #[arg(long = "man")]
    man: bool,

    /// Print more information about the conversion
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn main() {
    let App {
        input_dir,
        output_dir,
        staging,
        no_create_staging,
        extensions,
        frame_number,
        window_index,
        prefer_window,
        video,
        video_name,
        fps,
        codec,
        ffmpeg,
        man,
        verbose,
    } = App::parse();

    if man {
        println!("{}", MAN_PAGE);
        return;
    }

    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(if verbose { Level::DEBUG } else { Level::INFO })
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    // both are required by clap unless --man is given
    let (Some(input_dir), Some(output_dir)) = (input_dir, output_dir) else {
        error!("Missing input or output directory");
        std::process::exit(-1);
    };
    let staging = staging.unwrap_or_else(|| input_dir.join("PNG"));

    let mut options = ConversionOptions::new()
        .with_extensions(extensions)
        .with_frame(frame_number)
        .with_window_index(window_index);
    if prefer_window {
        options = options.prefer_window();
    }
    if no_create_staging {
        options = options.without_staging_creation();
    }

    info!(
        "Creating PNG frames in {} from DICOM images in {}",
        staging.display(),
        input_dir.display()
    );

    let summary = convert_dir(&input_dir, &staging, &options).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-1);
    });

    info!(
        "{} converted, {} failed, {} skipped",
        summary.converted.len(),
        summary.failed.len(),
        summary.skipped
    );

    let mut status = 0;
    if !summary.is_success() {
        for (file, e) in &summary.failed {
            warn!("{:?} error in {}: {}", e.kind(), file.display(), e);
        }
        status = -2;
    }

    if video {
        let video_options = VideoOptions {
            ffmpeg,
            frame_rate: fps,
            codec,
            ..Default::default()
        };
        let output = output_dir.join(video_name);
        let result: Result<(), Whatever> = std::fs::create_dir_all(&output_dir)
            .whatever_context("Could not create output directory")
            .and_then(|_| {
                assemble_video(&summary.converted, &output, &video_options)
                    .whatever_context("Could not assemble video")
            });
        if let Err(e) = result {
            error!("{}", Report::from_error(e));
            status = -3;
        }
    }

    if status != 0 {
        std::process::exit(status);
    }
}
