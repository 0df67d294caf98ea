//! Input file checks made before any parsing

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ValidationConfig;
use crate::error::Rejection;

/// A file that passed [`validate_input`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidFile {
    pub path: PathBuf,
    pub size: u64,
}

/// Check existence, size and extension, in that order. Only metadata is read.
pub fn validate_input(path: &Path, rules: &ValidationConfig) -> Result<ValidFile, Rejection> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return Err(Rejection::NotFound),
    };

    let size = metadata.len();
    if size > rules.max_size_bytes {
        return Err(Rejection::TooLarge {
            size,
            limit: rules.max_size_bytes,
        });
    }

    let required = rules.extension.trim_start_matches('.');
    let found = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");
    if !found.eq_ignore_ascii_case(required) {
        return Err(Rejection::WrongExtension {
            found: found.to_string(),
        });
    }

    Ok(ValidFile {
        path: path.to_path_buf(),
        size,
    })
}
