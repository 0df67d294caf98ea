//! Retention sweep for old log files

use chrono::{DateTime, Local, Months};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;

/// A log file that could not be inspected or removed
#[derive(Debug, Error)]
#[error("Error deleting old log file {}: {source}", path.display())]
pub struct RetentionError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Result of one sweep
#[derive(Debug, Default)]
pub struct RetentionReport {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<RetentionError>,
}

impl RetentionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Delete `*.log` files directly inside `directory` created more than one
/// calendar month before `now`. A missing directory is an empty sweep.
pub fn purge_stale_logs(directory: &Path, now: DateTime<Local>) -> RetentionReport {
    let mut report = RetentionReport::default();
    let cutoff: SystemTime = now
        .checked_sub_months(Months::new(1))
        .unwrap_or(now)
        .into();

    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
        Err(source) => {
            report.failures.push(RetentionError {
                path: directory.to_path_buf(),
                source,
            });
            return report;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(source) => {
                report.failures.push(RetentionError {
                    path: directory.to_path_buf(),
                    source,
                });
                continue;
            }
        };

        let path = entry.path();
        if !is_log_file(&path) {
            continue;
        }

        let created = match entry.metadata().and_then(|m| {
            if !m.is_file() {
                return Ok(None);
            }
            m.created().or_else(|_| m.modified()).map(Some)
        }) {
            Ok(Some(created)) => created,
            Ok(None) => continue,
            Err(source) => {
                report.failures.push(RetentionError { path, source });
                continue;
            }
        };

        if created < cutoff {
            match fs::remove_file(&path) {
                Ok(()) => report.removed.push(path),
                Err(source) => report.failures.push(RetentionError { path, source }),
            }
        }
    }

    report.removed.sort();
    report
}

fn is_log_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("log"))
}
