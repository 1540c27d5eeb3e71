//! Assembly of converted frames into a video through FFmpeg.
//!
//! FFmpeg's image sequence demuxer expects consecutively numbered files,
//! so the frames are first copied under a sequential naming scheme
//! (`frame_000000.png`, `frame_000001.png`, ...)
//! into a temporary directory, in the order given.
//! All frames are scaled to the size of the first one
//! and padded to even dimensions before encoding.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, info};

/// The file name pattern of the staged frames, as understood by FFmpeg.
pub const FRAME_PATTERN: &str = "frame_%06d.png";

/// Pad frames with a black row or column up to even dimensions,
/// which 4:2:0 chroma subsampling requires.
pub const EVEN_DIMENSIONS_FILTER: &str = "pad=ceil(iw/2)*2:ceil(ih/2)*2";

/// The video filter graph for frames of the given size:
/// frames of any other size are scaled to it,
/// then padded to even dimensions.
pub fn frame_filter((width, height): (u32, u32)) -> String {
    format!("scale={width}:{height},{EVEN_DIMENSIONS_FILTER}")
}

#[derive(Debug, Snafu)]
pub enum VideoError {
    /// No frames to assemble
    NoFrames,

    /// Frame rate must be greater than 0
    InvalidFrameRate,

    #[snafu(display("Could not stage frame {}", path.display()))]
    StageFrames {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not read frame size of {}", path.display()))]
    FrameSize {
        path: PathBuf,
        source: image::ImageError,
    },

    #[snafu(display("Could not run encoder `{}`", program.display()))]
    EncoderUnavailable {
        program: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Encoder exited with {}: {}", status, stderr.trim()))]
    EncoderFailed { status: ExitStatus, stderr: String },
}

pub type Result<T, E = VideoError> = std::result::Result<T, E>;

/// Options for encoding a video.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoOptions {
    /// the encoder executable
    pub ffmpeg: PathBuf,
    /// frames per second
    pub frame_rate: u32,
    /// the video codec passed to `-c:v`
    pub codec: String,
    /// the output pixel format passed to `-pix_fmt`
    pub pixel_format: String,
}

impl Default for VideoOptions {
    fn default() -> Self {
        VideoOptions {
            ffmpeg: PathBuf::from("ffmpeg"),
            frame_rate: 10,
            codec: "libx264".to_string(),
            pixel_format: "yuv420p".to_string(),
        }
    }
}

impl VideoOptions {
    /// The command line arguments for encoding the frames
    /// found in `frames_dir` into `output`,
    /// at a frame size of `size` (width, height).
    pub fn args(&self, frames_dir: &Path, output: &Path, size: (u32, u32)) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-framerate".into(),
            self.frame_rate.to_string().into(),
            "-i".into(),
            frames_dir.join(FRAME_PATTERN).into_os_string(),
            "-vf".into(),
            frame_filter(size).into(),
            "-c:v".into(),
            self.codec.clone().into(),
            "-pix_fmt".into(),
            self.pixel_format.clone().into(),
            output.as_os_str().to_owned(),
        ]
    }
}

/// Copy the frames into `dir` under the sequential naming scheme,
/// returning the number of frames staged.
pub fn stage_frames(frames: &[PathBuf], dir: &Path) -> Result<usize> {
    for (i, frame) in frames.iter().enumerate() {
        let target = dir.join(format!("frame_{i:06}.png"));
        std::fs::copy(frame, &target).context(StageFramesSnafu { path: frame })?;
    }
    Ok(frames.len())
}

/// Encode the given PNG frames, in order, into a video at `output`.
///
/// The call blocks until the encoder exits.
pub fn assemble_video(frames: &[PathBuf], output: &Path, options: &VideoOptions) -> Result<()> {
    ensure!(!frames.is_empty(), NoFramesSnafu);
    ensure!(options.frame_rate > 0, InvalidFrameRateSnafu);

    let staging = tempfile::tempdir().context(StageFramesSnafu {
        path: std::env::temp_dir(),
    })?;
    let count = stage_frames(frames, staging.path())?;
    debug!("Staged {} frame(s) in {}", count, staging.path().display());

    let first = &frames[0];
    let size = image::image_dimensions(first).context(FrameSizeSnafu { path: first })?;
    debug!("Frame size {}x{}", size.0, size.1);

    let args = options.args(staging.path(), output, size);
    debug!("Running {} {:?}", options.ffmpeg.display(), args);

    let result = Command::new(&options.ffmpeg)
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .context(EncoderUnavailableSnafu {
            program: &options.ffmpeg,
        })?;

    ensure!(
        result.status.success(),
        EncoderFailedSnafu {
            status: result.status,
            stderr: String::from_utf8_lossy(&result.stderr),
        }
    );

    info!("Video created: {} ({} frames)", output.display(), count);
    Ok(())
}
