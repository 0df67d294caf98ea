//! Logging lifecycle: retention sweep, sink selection and the logging context
//!
//! [`configure`] never fails. A log directory that cannot be created falls
//! back to the base directory, and a file sink that cannot be opened is
//! skipped. Both are reported on standard error immediately and again as
//! error events once [`LogContext::install`] has made the sinks live.

mod retention;

pub use retention::{RetentionError, RetentionReport, purge_stale_logs};

use chrono::{DateTime, Local};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::dispatcher::DefaultGuard;
use tracing::level_filters::LevelFilter;
use tracing::{Dispatch, Level, debug, error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{Layer, Registry, fmt};

use crate::config::{Layout, LoggingConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Severity threshold when the configuration does not set one
pub fn default_level() -> Level {
    if cfg!(debug_assertions) {
        Level::DEBUG
    } else {
        Level::ERROR
    }
}

/// File name of a session log: `<prefix>_<YYYYMMDD_HHmmss>.log`
pub fn session_file_name(prefix: &str, now: DateTime<Local>) -> String {
    format!("{}_{}.log", prefix, now.format("%Y%m%d_%H%M%S"))
}

/// Problems met while configuring, replayed once the sinks are installed
#[derive(Debug)]
enum StartupNote {
    DirectoryFallback { attempted: PathBuf, error: String },
    FileSinkSkipped { path: PathBuf, error: String },
    DefaultsSynthesized,
}

/// Explicitly constructed logging context, created once at process entry
pub struct LogContext {
    dispatch: Dispatch,
    directory: PathBuf,
    log_file: Option<PathBuf>,
    level: Level,
    retention: RetentionReport,
    notes: Vec<StartupNote>,
}

impl LogContext {
    /// Make this context the default for the current thread. Startup
    /// diagnostics are emitted on the first call.
    pub fn install(&mut self) -> DefaultGuard {
        let guard = tracing::dispatcher::set_default(&self.dispatch);
        self.emit_startup_diagnostics();
        guard
    }

    /// Directory holding the session log (the fallback directory if the
    /// logging subdirectory could not be created)
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn retention(&self) -> &RetentionReport {
        &self.retention
    }

    fn emit_startup_diagnostics(&mut self) {
        for note in std::mem::take(&mut self.notes) {
            match note {
                StartupNote::DirectoryFallback { attempted, error } => error!(
                    directory = %attempted.display(),
                    fallback = %self.directory.display(),
                    "Error creating log directory: {}",
                    error
                ),
                StartupNote::FileSinkSkipped { path, error } => error!(
                    path = %path.display(),
                    "Error configuring file sink: {}",
                    error
                ),
                StartupNote::DefaultsSynthesized => {
                    warn!("No sinks found in config, creating defaults in the log directory")
                }
            }
        }

        for path in std::mem::take(&mut self.retention.removed) {
            info!("Deleted old log file: {}", path.display());
        }
        for failure in std::mem::take(&mut self.retention.failures) {
            error!("{}", failure);
        }

        debug!(level = %self.level, "Logging configured");
    }
}

/// Build the logging context rooted at `base_dir`.
///
/// The retention sweep runs on the logging directory before the session file
/// is created. It is skipped when logging falls back to `base_dir`, which may
/// hold logs that belong to other programs.
pub fn configure(base_dir: &Path, config: &LoggingConfig, now: DateTime<Local>) -> LogContext {
    let mut notes = Vec::new();

    let wanted = base_dir.join(&config.directory);
    let (directory, retention) = match fs::create_dir_all(&wanted) {
        Ok(()) => {
            let retention = purge_stale_logs(&wanted, now);
            (wanted, retention)
        }
        Err(e) => {
            eprintln!("Error creating log directory: {}", e);
            notes.push(StartupNote::DirectoryFallback {
                attempted: wanted,
                error: e.to_string(),
            });
            (base_dir.to_path_buf(), RetentionReport::default())
        }
    };

    let level = config
        .level
        .as_deref()
        .and_then(|level| Level::from_str(level).ok())
        .unwrap_or_else(default_level);
    let filter = LevelFilter::from_level(level);

    let (console, file, prefix) = match (config.console_sink(), config.file_sink()) {
        (None, None) => {
            notes.push(StartupNote::DefaultsSynthesized);
            (Some(Layout::Full), Some(Layout::Full), "default")
        }
        (console, file) => (console, file, "application"),
    };

    let mut layers: Vec<BoxedLayer> = Vec::new();

    if let Some(layout) = console {
        layers.push(console_layer(layout, filter));
    }

    let mut log_file = None;
    if let Some(layout) = file {
        let path = directory.join(session_file_name(prefix, now));
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(handle) => {
                layers.push(file_layer(layout, filter, handle));
                log_file = Some(path);
            }
            Err(e) => {
                eprintln!("Error configuring file sink: {}", e);
                notes.push(StartupNote::FileSinkSkipped {
                    path,
                    error: e.to_string(),
                });
            }
        }
    }

    let subscriber = Registry::default().with(layers);

    LogContext {
        dispatch: Dispatch::new(subscriber),
        directory,
        log_file,
        level,
        retention,
        notes,
    }
}

fn console_layer(layout: Layout, filter: LevelFilter) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_thread_names(true)
        .with_target(true);
    match layout {
        Layout::Full => layer.with_filter(filter).boxed(),
        Layout::Compact => layer.compact().with_filter(filter).boxed(),
    }
}

fn file_layer(layout: Layout, filter: LevelFilter, file: fs::File) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .with_target(true);
    match layout {
        Layout::Full => layer.with_filter(filter).boxed(),
        Layout::Compact => layer.compact().with_filter(filter).boxed(),
    }
}
