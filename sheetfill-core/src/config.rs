//! Configuration loaded from `sheetfill.toml`

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;
use crate::reader::CellRange;

/// File name looked up in the application base directory
pub const CONFIG_FILE_NAME: &str = "sheetfill.toml";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SheetfillConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl SheetfillConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the configuration: explicit path, then `sheetfill.toml` in
    /// `base_dir`, then defaults. The result is validated.
    pub fn load(explicit: Option<&Path>, base_dir: &Path) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = base_dir.join(CONFIG_FILE_NAME);
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(level) = &self.logging.level {
            if tracing::Level::from_str(level).is_err() {
                return Err(ConfigError::Invalid(format!(
                    "unknown log level '{}' in [logging]",
                    level
                )));
            }
        }

        if self.validation.extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::Invalid(
                "extension in [validation] must not be empty".to_string(),
            ));
        }

        if self.pipeline.selectors.iter().all(|s| s.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "selectors in [pipeline] must contain at least one name".to_string(),
            ));
        }

        if !self.pipeline.fill_start.is_finite() {
            return Err(ConfigError::Invalid(
                "fill_start in [pipeline] must be a finite number".to_string(),
            ));
        }

        Ok(())
    }
}

/// Logging sinks and threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Overrides the build default (debug in debug builds, error in release)
    pub level: Option<String>,
    /// Subdirectory of the base directory that holds log files
    pub directory: String,
    /// Declared sinks; when empty a console and a file sink are synthesized
    pub sinks: Vec<SinkConfig>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            directory: "logging".to_string(),
            sinks: Vec::new(),
        }
    }
}

impl LoggingConfig {
    pub fn console_sink(&self) -> Option<Layout> {
        self.sinks.iter().find_map(|sink| match sink {
            SinkConfig::Console { layout } => Some(*layout),
            _ => None,
        })
    }

    pub fn file_sink(&self) -> Option<Layout> {
        self.sinks.iter().find_map(|sink| match sink {
            SinkConfig::File { layout } => Some(*layout),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    Console {
        #[serde(default)]
        layout: Layout,
    },
    File {
        #[serde(default)]
        layout: Layout,
    },
}

/// Line layout of a sink
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Timestamp, thread, level, target and message
    #[default]
    Full,
    Compact,
}

/// Input file constraints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub max_size_bytes: u64,
    /// Required extension, compared case-insensitively
    pub extension: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 10 * 1024 * 1024,
            extension: "xlsx".to_string(),
        }
    }
}

/// Range, fill and recognized selectors
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub range: CellRange,
    pub fill_start: f64,
    pub selectors: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            range: CellRange::default(),
            fill_start: 1.0,
            selectors: vec!["test1".to_string(), "test2".to_string()],
        }
    }
}

/// Directory of the running executable, or the working directory
pub fn application_base_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}
