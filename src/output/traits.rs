//! Output writer traits and types
//!
//! This module defines the trait interface for dataset writers and the
//! error type shared by every file the crawler produces.

use crate::model::AdminNode;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to serialize output: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Receives the assembled tree of one dataset
///
/// Writers are handed the finished tree and the dataset's file name; what
/// they do with it is up to them.
pub trait DatasetWriter {
    /// Writes `tree` under `file_name`
    ///
    /// # Returns
    ///
    /// * `Ok(path)` - Where the tree was written
    /// * `Err(OutputError)` - The tree could not be written
    fn write_dataset(&self, file_name: &str, tree: &[AdminNode]) -> OutputResult<PathBuf>;
}

/// Validates a dataset file name before it is joined onto a directory
pub(crate) fn check_file_name(file_name: &str) -> OutputResult<()> {
    let valid = !file_name.is_empty()
        && !file_name.contains(['/', '\\'])
        && file_name != "."
        && file_name != "..";
    if valid {
        Ok(())
    } else {
        Err(OutputError::Write(format!(
            "invalid dataset file name '{}'",
            file_name
        )))
    }
}
