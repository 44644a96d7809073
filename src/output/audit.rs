//! Audit trails under the log directory
//!
//! - `page-cache-clean/<runDate>.all.json` and `<runDate>.error.json` list the
//!   keys seen and the keys about to be deleted by a cache clean
//! - `run-records/<runDate>/<year>.json` holds one exported queue record

use crate::cache::ScanReport;
use crate::history::RunRecord;
use crate::output::json::write_json_file;
use crate::output::traits::{check_file_name, OutputResult};
use std::path::{Path, PathBuf};

/// Writes the key lists of a cache scan before anything is purged
///
/// # Returns
///
/// The paths of the `all` and `error` files
pub fn write_clean_audit(
    log_dir: &Path,
    run_date: i64,
    scan: &ScanReport,
) -> OutputResult<(PathBuf, PathBuf)> {
    let dir = log_dir.join("page-cache-clean");
    let all_path = dir.join(format!("{}.all.json", run_date));
    let error_path = dir.join(format!("{}.error.json", run_date));

    write_json_file(&all_path, &scan.all_keys)?;
    write_json_file(&error_path, &scan.invalid_keys)?;

    tracing::info!(
        "Cache audit written: {} keys, {} invalid",
        scan.all_keys.len(),
        scan.invalid_keys.len()
    );
    Ok((all_path, error_path))
}

/// Exports every run's queue records, one file per run and dataset
///
/// Existing exports are overwritten; the stored history stays the source of
/// truth.
pub fn export_run_history(log_dir: &Path, history: &[RunRecord]) -> OutputResult<Vec<PathBuf>> {
    let root = log_dir.join("run-records");
    let mut written = Vec::new();

    for run in history {
        let run_dir = root.join(run.run_date.to_string());
        for queue in &run.queues {
            let file_name = format!("{}.json", queue.year);
            check_file_name(&file_name)?;
            let path = run_dir.join(file_name);
            write_json_file(&path, queue)?;
            written.push(path);
        }
    }

    tracing::info!(
        "Exported {} queue records from {} runs",
        written.len(),
        history.len()
    );
    Ok(written)
}
