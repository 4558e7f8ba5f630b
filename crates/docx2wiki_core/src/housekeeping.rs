use std::fs;
use std::path::Path;

use crate::journal::RunLog;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed_files: usize,
    pub failed: usize,
}

/// Delete everything below `dir`, keeping `dir` itself. Every removal and
/// every failure is journaled; nothing here aborts the run.
pub fn clear_directory(dir: &Path, log: &RunLog) -> CleanupReport {
    let mut report = CleanupReport::default();
    if dir.exists() {
        clear_into(dir, log, &mut report);
    }
    report
}

fn clear_into(dir: &Path, log: &RunLog, report: &mut CleanupReport) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(error) => {
            log.error(format!("failed to list {}: {error}", dir.display()));
            report.failed += 1;
            return;
        }
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if entry.file_type().is_ok_and(|kind| kind.is_dir()) {
            clear_into(&path, log, report);
            if let Err(error) = fs::remove_dir(&path) {
                log.error(format!("failed to remove folder {}: {error}", path.display()));
                report.failed += 1;
            }
            continue;
        }
        remove_with_journal(&path, log, report);
    }
}

/// Remove the converted markup written beside a source document.
pub fn remove_converted(html_path: &Path, log: &RunLog) -> CleanupReport {
    let mut report = CleanupReport::default();
    if html_path.exists() {
        remove_with_journal(html_path, log, &mut report);
    }
    report
}

fn remove_with_journal(path: &Path, log: &RunLog, report: &mut CleanupReport) {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    match fs::remove_file(path) {
        Ok(()) => {
            log.info(format!("deleted file: {name}"));
            report.removed_files += 1;
        }
        Err(error) => {
            log.error(format!("failed to delete file {name}: {error}"));
            report.failed += 1;
        }
    }
}
