//! JSON file output
//!
//! Every artifact the crawler writes is a pretty-printed JSON document. Files
//! are written to a temporary sibling first and renamed into place, so a
//! crash never leaves a truncated dataset behind.

use crate::model::AdminNode;
use crate::output::traits::{check_file_name, DatasetWriter, OutputResult};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Serializes `value` as pretty JSON to `path`, creating parent directories
pub fn write_json_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> OutputResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Writes each dataset tree to `<data_dir>/<file_name>`
#[derive(Debug, Clone)]
pub struct JsonFileWriter {
    data_dir: PathBuf,
}

impl JsonFileWriter {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

impl DatasetWriter for JsonFileWriter {
    fn write_dataset(&self, file_name: &str, tree: &[AdminNode]) -> OutputResult<PathBuf> {
        check_file_name(file_name)?;
        let path = self.data_dir.join(file_name);
        write_json_file(&path, tree)?;
        tracing::info!("Wrote {} provinces to {}", tree.len(), path.display());
        Ok(path)
    }
}
