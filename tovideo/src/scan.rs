//! Listing of the DICOM files in an input directory.

use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu, ensure};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Snafu)]
pub enum ScanError {
    #[snafu(display("Directory {} does not exist", path.display()))]
    DirectoryMissing { path: PathBuf },

    #[snafu(display("Could not read directory {}", path.display()))]
    ReadDirectory {
        path: PathBuf,
        source: walkdir::Error,
    },
}

/// The outcome of listing an input directory.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Scan {
    /// matching files, sorted by file name
    pub files: Vec<PathBuf>,
    /// number of entries which were not matching files
    pub skipped: usize,
}

/// Check whether the path has one of the given extensions,
/// ignoring ASCII case.
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// List the regular files directly inside `dir`
/// whose extension is one of `extensions`.
///
/// Subdirectories are not traversed.
/// Entries which cannot be read are skipped with a warning.
pub fn scan_dir(dir: &Path, extensions: &[String]) -> Result<Scan, ScanError> {
    ensure!(dir.is_dir(), DirectoryMissingSnafu { path: dir });

    let mut scan = Scan::default();
    let entries = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(e).context(ReadDirectorySnafu { path: dir });
            }
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                scan.skipped += 1;
                continue;
            }
        };

        let path = entry.into_path();
        if path.is_file() && has_extension(&path, extensions) {
            scan.files.push(path);
        } else {
            debug!("Skipping {}", path.display());
            scan.skipped += 1;
        }
    }

    Ok(scan)
}
