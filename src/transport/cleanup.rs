//! Best-effort removal of a request's scratch files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::LabelFuseError;

/// Removes `files`, then the directory holding them.
///
/// A path that is already gone is fine; any other failure stops the cleanup
/// and is returned as [`LabelFuseError::CleanupFailed`].
pub fn remove_scratch(directory: &Path, files: &[PathBuf]) -> Result<(), LabelFuseError> {
    for file in files {
        absorb_missing(file, fs::remove_file(file))?;
    }
    absorb_missing(directory, fs::remove_dir(directory))
}

fn absorb_missing(path: &Path, outcome: io::Result<()>) -> Result<(), LabelFuseError> {
    match outcome {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(LabelFuseError::CleanupFailed {
            path: path.to_path_buf(),
            source,
        }),
    }
}
