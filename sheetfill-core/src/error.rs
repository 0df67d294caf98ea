//! Error and rejection types
//!
//! Recoverable outcomes ([`Rejection`]) are returned by value and only logged.
//! [`PipelineError`] is the narrow set of faults that abort the call chain.

use std::path::PathBuf;
use thiserror::Error;

/// User input rejected before any workbook is opened
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("File not found or invalid file path provided")]
    NotFound,
    #[error("File exceeds maximum allowed size: {size} bytes (limit {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },
    #[error("Invalid file type: '{found}'")]
    WrongExtension { found: String },
    #[error("No option provided")]
    MissingOption,
    #[error("Unknown option: {0}")]
    UnknownOption(String),
}

/// Fatal workbook faults
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to open file: {}", path.display())]
    WorkbookOpen {
        path: PathBuf,
        #[source]
        source: WorkbookError,
    },
    #[error("Failed to save workbook: {}", path.display())]
    WorkbookSave {
        path: PathBuf,
        #[source]
        source: WorkbookError,
    },
}

/// Low-level failures while reading or rewriting an xlsx package
#[derive(Debug, Error)]
pub enum WorkbookError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Calamine(#[from] calamine::XlsxError),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),
    #[error("Malformed worksheet XML: {0}")]
    Malformed(String),
    #[error("Worksheet '{0}' has no part in the package")]
    MissingWorksheetPart(String),
    #[error("Values do not fit range {range}: expected {expected_rows}x{expected_cols}")]
    ShapeMismatch {
        range: String,
        expected_rows: usize,
        expected_cols: usize,
    },
    #[error("Cannot store non-finite value {0} in a cell")]
    NonFinite(f64),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellRangeError {
    #[error("Invalid cell range: '{0}'")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Configuration error: {0}")]
    Invalid(String),
}
